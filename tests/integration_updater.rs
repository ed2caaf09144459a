//! Integration tests for the updater façade, driven by a scripted in-memory
//! source: which network operations run, which are skipped, and how failures
//! surface from `check_now`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream;
use upkeep::ed25519_dalek::{Signer, SigningKey};
use upkeep::{Config, Source, UpdateError, UpdateStream, Version, manage};

#[derive(Default)]
struct Counters {
    latest_version: AtomicUsize,
    get: AtomicUsize,
    get_signature: AtomicUsize,
}

enum SignatureReply {
    Bytes([u8; 64]),
    WrongLength(u64),
}

/// In-memory source replaying a fixed build, signature, and publication date.
struct ScriptedSource {
    date: DateTime<Utc>,
    payload: Vec<u8>,
    signature: SignatureReply,
    counters: Arc<Counters>,
}

#[async_trait]
impl Source for ScriptedSource {
    async fn latest_version(&self) -> Result<Version, UpdateError> {
        self.counters.latest_version.fetch_add(1, Ordering::SeqCst);
        Ok(Version::from_date(self.date))
    }

    async fn get(
        &self,
        _current: Option<&Version>,
    ) -> Result<(UpdateStream, Option<u64>), UpdateError> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<io::Result<Bytes>> =
            self.payload.chunks(10).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        Ok((Box::pin(stream::iter(chunks)), Some(self.payload.len() as u64)))
    }

    async fn get_signature(&self) -> Result<[u8; 64], UpdateError> {
        self.counters.get_signature.fetch_add(1, Ordering::SeqCst);
        match self.signature {
            SignatureReply::Bytes(signature) => Ok(signature),
            SignatureReply::WrongLength(length) => Err(UpdateError::SignatureShape { length }),
        }
    }
}

fn published_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
}

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

fn scripted(payload: &[u8], signature: SignatureReply) -> (ScriptedSource, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let source = ScriptedSource {
        date: published_at(),
        payload: payload.to_vec(),
        signature,
        counters: Arc::clone(&counters),
    };
    (source, counters)
}

#[tokio::test]
async fn no_update_when_local_build_is_current() {
    let key = signing_key();
    let payload = b"new build bytes";
    let signature = key.sign(payload).to_bytes();
    let (source, counters) = scripted(payload, SignatureReply::Bytes(signature));

    let config = Config::new(source, key.verifying_key())
        // Same date as the published build: nothing to do.
        .current(Version::from_date(published_at()));

    let updater = manage(config).unwrap();
    updater.check_now().await.unwrap();

    assert_eq!(counters.latest_version.load(Ordering::SeqCst), 1);
    assert_eq!(counters.get_signature.load(Ordering::SeqCst), 0);
    assert_eq!(counters.get.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn declined_upgrade_fetches_nothing() {
    let key = signing_key();
    let payload = b"new build bytes";
    let signature = key.sign(payload).to_bytes();
    let (source, counters) = scripted(payload, SignatureReply::Bytes(signature));

    let asked = Arc::new(AtomicUsize::new(0));
    let asked_in_callback = Arc::clone(&asked);

    let config = Config::new(source, key.verifying_key())
        .current(Version::from_date(published_at() - chrono::TimeDelta::hours(1)))
        .confirm_upgrade(move |_message| {
            asked_in_callback.fetch_add(1, Ordering::SeqCst);
            false
        });

    let updater = manage(config).unwrap();
    updater.check_now().await.unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(counters.get_signature.load(Ordering::SeqCst), 0);
    assert_eq!(counters.get.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_signature_length_aborts_before_the_body_fetch() {
    let key = signing_key();
    let (source, counters) = scripted(b"new build bytes", SignatureReply::WrongLength(63));

    let config = Config::new(source, key.verifying_key())
        .current(Version::from_date(published_at() - chrono::TimeDelta::hours(1)));

    let updater = manage(config).unwrap();
    let result = updater.check_now().await;

    assert!(matches!(result, Err(UpdateError::SignatureShape { length: 63 })));
    assert_eq!(counters.get_signature.load(Ordering::SeqCst), 1);
    assert_eq!(counters.get.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tampered_body_fails_verification_and_reports_progress() {
    let key = signing_key();
    // Signature over one payload, body delivering another.
    let signature = key.sign(b"the signed build").to_bytes();
    let (source, counters) = scripted(b"a tampered build!", SignatureReply::Bytes(signature));

    let fractions = Arc::new(std::sync::Mutex::new(Vec::new()));
    let fractions_sink = Arc::clone(&fractions);
    let restart_asked = Arc::new(AtomicUsize::new(0));
    let restart_asked_in_callback = Arc::clone(&restart_asked);

    let config = Config::new(source, key.verifying_key())
        .current(Version::from_date(published_at() - chrono::TimeDelta::hours(1)))
        .on_progress(move |fraction| fractions_sink.lock().unwrap().push(fraction))
        .confirm_restart(move || {
            restart_asked_in_callback.fetch_add(1, Ordering::SeqCst);
            false
        });

    let updater = manage(config).unwrap();
    let result = updater.check_now().await;

    assert!(matches!(result, Err(UpdateError::Verification(_))));
    assert_eq!(counters.get.load(Ordering::SeqCst), 1);
    // Verification failed, so the restart gate must never have been reached.
    assert_eq!(restart_asked.load(Ordering::SeqCst), 0);

    // The whole body flowed through the progress reader before verification:
    // non-decreasing fractions, ending at exactly 1.0.
    let seen = fractions.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[tokio::test]
async fn checks_are_serialised_per_updater() {
    let key = signing_key();
    let payload = b"new build bytes";
    let signature = key.sign(payload).to_bytes();
    let (source, counters) = scripted(payload, SignatureReply::Bytes(signature));

    let config =
        Config::new(source, key.verifying_key()).current(Version::from_date(published_at()));

    let updater = manage(config).unwrap();
    let (first, second) =
        tokio::join!(updater.check_now(), updater.check_now());
    first.unwrap();
    second.unwrap();

    assert_eq!(counters.latest_version.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stop_cancels_the_background_worker() {
    let key = signing_key();
    let payload = b"new build bytes";
    let signature = key.sign(payload).to_bytes();
    let (source, _counters) = scripted(payload, SignatureReply::Bytes(signature));

    let config =
        Config::new(source, key.verifying_key()).current(Version::from_date(published_at()));

    let updater = manage(config).unwrap();
    updater.stop();

    // Manual checks keep working after the worker is gone.
    updater.check_now().await.unwrap();
}
