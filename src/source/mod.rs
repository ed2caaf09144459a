//! The transport abstraction updates are fetched through.
//!
//! A [`Source`] decouples the update engine from wherever builds are
//! published. The crate ships [`HttpSource`](crate::HttpSource) for plain
//! HTTP object storage; applications with their own distribution channel
//! (registry API, peer-to-peer, a file share) implement the trait
//! themselves.
//!
//! The one contract implementations must keep: the signature returned by
//! [`Source::get_signature`] must correspond to the exact bytes the next
//! [`Source::get`] yields. Publishers that upload image and signature
//! independently have to make that pair atomic.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::UpdateError;
use crate::version::Version;

pub mod http;

/// Byte stream of a new executable image.
pub type UpdateStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// A place updates can be fetched from.
#[async_trait]
pub trait Source: Send + Sync {
    /// Version metadata of the latest published build. The `date` field is
    /// authoritative for deciding whether an update should run.
    async fn latest_version(&self) -> Result<Version, UpdateError>;

    /// Fetch the new image. `current`, when known, lets the transport make
    /// the fetch conditional (HTTP `If-Modified-Since`). Returns the body
    /// stream and the content length when the transport knows it.
    async fn get(
        &self,
        current: Option<&Version>,
    ) -> Result<(UpdateStream, Option<u64>), UpdateError>;

    /// Fetch the detached Ed25519 signature over the image the next
    /// [`get`](Source::get) will yield. Exactly 64 bytes; transports must
    /// reject any other size with [`UpdateError::SignatureShape`].
    async fn get_signature(&self) -> Result<[u8; 64], UpdateError>;
}
