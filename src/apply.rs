//! The apply engine: atomic, crash-safe replacement of an on-disk
//! executable.
//!
//! [`apply`] takes a byte stream and an [`ApplyOptions`] and drives the swap
//! protocol:
//!
//! 1. Materialise the new image (draining the stream, or patching the
//!    current file when a [`Patcher`] is configured).
//! 2. Verify the checksum and/or signature of the materialised image.
//! 3. Stage the image as `/dir/.name.new` next to the target.
//! 4. Shelve the live file as `/dir/.name.old`.
//! 5. Promote `.new` over the target.
//! 6. Dispose of `.old`, falling back to hiding it when the OS still maps
//!    the old image (Windows).
//!
//! The ordering is what makes the swap recoverable: nothing touches the live
//! executable until its replacement is fully written and verified on the
//! same filesystem, and a failed promotion renames the shelved file back.
//!
//! # Examples
//!
//! ```rust,no_run
//! use upkeep::{apply, ApplyOptions};
//! use futures::stream;
//!
//! # async fn example(image: Vec<u8>) -> Result<(), upkeep::UpdateError> {
//! // Unsigned apply of a fully trusted image to an explicit path.
//! let stream = stream::iter(vec![Ok(bytes::Bytes::from(image))]);
//! let options = ApplyOptions { target_path: Some("/opt/app/bin/app".into()), ..Default::default() };
//! apply(stream, options).await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::UpdateError;
use crate::patch::Patcher;
use crate::platform;
use crate::verify::{HashKind, PublicKey, Verifier};

/// Options controlling a single [`apply`] run.
///
/// Signature verification is all-or-nothing: setting exactly one of
/// `signature` and `public_key` is a configuration error. When both are
/// unset the image is applied without authenticity checks, which is only
/// sane for callers with their own trust chain.
#[derive(Default)]
pub struct ApplyOptions {
    /// File to replace. `None` means the symlink-resolved path of the
    /// running executable.
    pub target_path: Option<PathBuf>,
    /// POSIX permission bits for the replacement. Defaults to `0o755`;
    /// ignored on Windows.
    pub target_mode: Option<u32>,
    /// Expected digest of the new image, compared byte-wise after
    /// materialisation.
    pub checksum: Option<Vec<u8>>,
    /// Public key the signature must verify against.
    pub public_key: Option<PublicKey>,
    /// Detached signature over the new image (raw 64 bytes for Ed25519, DER
    /// for the legacy schemes).
    pub signature: Option<Vec<u8>>,
    /// Signature scheme override. When unset the scheme is derived from the
    /// public key's algorithm.
    pub verifier: Option<Box<dyn Verifier>>,
    /// Digest algorithm for `checksum` and the legacy signature schemes.
    /// Defaults to SHA-256.
    pub hash: Option<HashKind>,
    /// When set, the input stream is a binary patch against the current
    /// target file rather than a complete image.
    pub patcher: Option<Box<dyn Patcher>>,
}

/// Apply a new image to the target file with the atomic swap protocol.
///
/// On success returns the resolved target path, which callers re-exec after
/// a confirmed restart. On failure the error variant tells how far the
/// protocol got; see [`UpdateError`] for the recovery semantics of each
/// phase.
pub async fn apply<S>(mut stream: S, options: ApplyOptions) -> Result<PathBuf, UpdateError>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
    let ApplyOptions {
        target_path,
        target_mode,
        checksum,
        public_key,
        signature,
        verifier,
        hash,
        patcher,
    } = options;

    let verification = match (signature, public_key) {
        (Some(signature), Some(key)) => Some((signature, key)),
        (Some(_), None) => return Err(UpdateError::Config("no public key to verify the signature with")),
        (None, Some(_)) => return Err(UpdateError::Config("no signature to verify with")),
        (None, None) => None,
    };
    let hash = hash.unwrap_or_default();

    let target = resolve_target(target_path)?;

    let mut payload = Vec::new();
    while let Some(chunk) = stream.next().await {
        payload.extend_from_slice(&chunk?);
    }

    let new_bytes = match &patcher {
        Some(patcher) => {
            let old = fs::read(&target).await?;
            let mut patched = Vec::new();
            patcher
                .patch(&mut old.as_slice(), &mut patched, &mut payload.as_slice())
                .map_err(UpdateError::Patch)?;
            patched
        }
        None => payload,
    };

    if let Some(expected) = &checksum {
        let actual = hash.digest(&new_bytes);
        if actual != *expected {
            return Err(UpdateError::Checksum {
                expected: hex_string(expected),
                actual: hex_string(&actual),
            });
        }
    }

    if let Some((signature, key)) = &verification {
        match &verifier {
            Some(custom) => custom.verify(&new_bytes, signature, hash, key)?,
            None => key.default_verifier().verify(&new_bytes, signature, hash, key)?,
        }
    }

    let (new_path, old_path) = companion_paths(&target)?;

    let mode = target_mode.unwrap_or(platform::DEFAULT_EXECUTABLE_MODE);
    stage(&new_path, &new_bytes, mode).await.map_err(UpdateError::Staging)?;

    // Any stale `.old` must go first: Windows cannot rename over an existing
    // file, and after a previous update it cannot have removed the mapped
    // old image either.
    let _ = fs::remove_file(&old_path).await;
    fs::rename(&target, &old_path).await.map_err(UpdateError::Shelve)?;

    if let Err(promote) = fs::rename(&new_path, &target).await {
        let recover = fs::rename(&old_path, &target).await.err();
        return Err(UpdateError::Promote { promote, recover });
    }

    if let Err(err) = fs::remove_file(&old_path).await {
        debug!("could not remove {}, hiding it instead: {err}", old_path.display());
        let _ = platform::hide_file(&old_path);
    }

    Ok(target)
}

/// Report whether the process may update the target, without touching it.
///
/// Repeats the staging step with an empty probe file in the target's
/// directory and deletes it again, returning the error an actual apply
/// would hit.
pub async fn check_permissions(options: &ApplyOptions) -> Result<(), UpdateError> {
    let target = resolve_target(options.target_path.clone())?;
    let (probe, _) = companion_paths(&target)?;
    let mode = options.target_mode.unwrap_or(platform::DEFAULT_EXECUTABLE_MODE);

    stage(&probe, &[], mode).await.map_err(UpdateError::Staging)?;
    let _ = fs::remove_file(&probe).await;
    Ok(())
}

fn resolve_target(target_path: Option<PathBuf>) -> Result<PathBuf, UpdateError> {
    match target_path {
        Some(path) => Ok(path),
        None => Ok(platform::current_exe_path()?),
    }
}

fn companion_paths(target: &Path) -> Result<(PathBuf, PathBuf), UpdateError> {
    let dir = target
        .parent()
        .ok_or(UpdateError::Config("target path has no parent directory"))?;
    let name = target
        .file_name()
        .ok_or(UpdateError::Config("target path has no file name"))?
        .to_string_lossy();
    Ok((dir.join(format!(".{name}.new")), dir.join(format!(".{name}.old"))))
}

async fn stage(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let mut open = fs::OpenOptions::new();
    open.write(true).create(true).truncate(true);
    #[cfg(unix)]
    open.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = open.open(path).await?;
    file.write_all(contents).await?;
    // Without the flush-and-close Windows keeps the staged file "in use" and
    // the promotion rename fails.
    file.sync_all().await?;
    drop(file);
    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
