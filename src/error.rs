//! Error types for the update pipeline.
//!
//! Every fallible operation in this crate returns [`UpdateError`]. The
//! variants follow the phases of an update check so callers can tell a
//! transport failure apart from an authenticity failure or a half-finished
//! swap:
//!
//! - [`UpdateError::Source`] wraps whatever the transport reported; custom
//!   [`Source`](crate::Source) implementations are free to put any
//!   [`anyhow::Error`] in here.
//! - [`UpdateError::SignatureShape`] and [`UpdateError::Verification`] are
//!   authenticity failures and are never downgraded or suppressed.
//! - [`UpdateError::Staging`], [`UpdateError::Shelve`] and
//!   [`UpdateError::Promote`] map to the three filesystem transitions of the
//!   swap protocol. Only `Promote` can leave the target in need of recovery,
//!   and it carries the outcome of the recovery attempt alongside the
//!   original failure.

use std::io;
use thiserror::Error;

/// Errors produced while checking for, verifying, or applying an update.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The running operating system is not supported by the apply engine.
    #[error("operating system not supported")]
    Unsupported,

    /// The update source failed to deliver version metadata, a signature, or
    /// the new image.
    #[error("update source error: {0}")]
    Source(#[source] anyhow::Error),

    /// A signature object had the wrong size. Ed25519 signatures are exactly
    /// 64 bytes; anything else is rejected before any body bytes are fetched.
    #[error("ed25519 signature must be 64 bytes long and was {length}")]
    SignatureShape { length: u64 },

    /// Signature verification failed: the signature does not match the new
    /// image, could not be decoded, or was checked against a key of the
    /// wrong algorithm.
    #[error("signature verification failed: {0}")]
    Verification(String),

    /// The new image hashed to something other than the expected checksum.
    #[error("updated file has wrong checksum, expected: {expected}, got: {actual}")]
    Checksum { expected: String, actual: String },

    /// The apply options were inconsistent, e.g. a signature without a public
    /// key or the other way around.
    #[error("{0}")]
    Config(&'static str),

    /// The staged `.new` file could not be created or written. The live
    /// executable has not been touched.
    #[error("failed to stage the new executable")]
    Staging(#[source] io::Error),

    /// The live executable could not be moved aside to `.old`. The live
    /// executable is still in place; the staged file is left for inspection.
    #[error("failed to shelve the current executable")]
    Shelve(#[source] io::Error),

    /// Renaming the staged file over the target failed. A recovery rename of
    /// the shelved `.old` back into place was attempted; `recover` is `None`
    /// when that rename succeeded and the previous executable is live again.
    #[error(
        "failed to promote the staged executable, recovery of the previous executable {}",
        .recover.as_ref().map_or_else(|| "succeeded".to_string(), |e| format!("failed: {e}"))
    )]
    Promote {
        #[source]
        promote: io::Error,
        recover: Option<io::Error>,
    },

    /// The bsdiff patch could not be applied to the current executable.
    #[error("failed to apply the binary patch")]
    Patch(#[source] io::Error),

    /// The replacement process could not be spawned during restart.
    #[error("failed to spawn the replacement process")]
    Spawn(#[source] io::Error),

    /// Any other I/O failure: resolving the executable path, reading its
    /// modification time, or draining the update stream.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Source(anyhow::Error::new(err))
    }
}
