//! upkeep — in-process self-update for long-running applications
//!
//! An embeddable updater that periodically fetches a newer build of the
//! running executable, verifies its authenticity, and atomically replaces
//! the binary on disk so the next launch runs the new version. The pieces
//! that make this safe:
//!
//! - **Authenticity first**: builds are signed with Ed25519 and the
//!   signature is checked over the complete new image before a single byte
//!   of the live executable is touched. Legacy RSA / ECDSA / DSA pipelines
//!   are supported through the pluggable [`Verifier`] capability.
//! - **Crash-safe swap**: the replacement is staged next to the target,
//!   the live file is shelved, the staged file is promoted, and only then is
//!   the shelved file disposed of — with the Windows-specific fallback of
//!   hiding the old image when the OS still maps it. A failed promotion
//!   restores the previous binary.
//! - **Delta updates**: a source may serve a bsdiff patch against the
//!   installed executable instead of a full image ([`Patcher`]).
//! - **Scheduling**: check on start, on a fixed interval, or on a
//!   calendar-aligned recurrence (hourly / daily / monthly at a configured
//!   clock time).
//!
//! # Architecture Overview
//!
//! ```text
//! scheduler (background task)
//!    └── Updater::check_now
//!          ├── Source::latest_version     is there a newer build?
//!          ├── upgrade confirm callback   host application gates the fetch
//!          ├── Source::get_signature      64-byte Ed25519 signature
//!          ├── Source::get                image stream (+ progress reports)
//!          ├── apply                      verify, stage, shelve, promote
//!          └── restart confirm callback → restart into the new binary
//! ```
//!
//! # Core Modules
//!
//! - [`updater`] - [`Config`], [`Updater`], [`manage`], [`manual_update`]
//! - [`apply`](mod@apply) - the atomic swap engine and [`ApplyOptions`]
//! - [`source`] - the [`Source`] transport contract and [`HttpSource`]
//! - [`verify`] - signature schemes behind the [`Verifier`] capability
//! - [`patch`] - bsdiff patch application behind [`Patcher`]
//! - [`schedule`] - [`Schedule`], recurrence math
//! - [`progress`] - download progress reporting
//!
//! # Getting Started
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use upkeep::{manage, Config, HttpSource, Schedule};
//!
//! # async fn example() -> Result<(), upkeep::UpdateError> {
//! // One URL serves every platform through the template tokens.
//! let source = HttpSource::new(None, "https://dl.example.com/myapp-{{.OS}}-{{.Arch}}{{.Ext}}");
//!
//! // The Ed25519 public key matching the key the release pipeline signs with.
//! let public_key = upkeep::ed25519_dalek::VerifyingKey::from_bytes(&[
//!     178, 103, 83, 57, 61, 138, 18, 249, 244, 80, 163, 162, 24, 251, 190, 241, 11, 168, 179,
//!     41, 245, 27, 166, 70, 220, 254, 118, 169, 101, 26, 199, 129,
//! ])
//! .expect("embedded public key is valid");
//!
//! let config = Config::new(source, public_key)
//!     .schedule(Schedule {
//!         fetch_on_start: true,
//!         interval: Some(Duration::from_secs(24 * 3600)),
//!         ..Schedule::default()
//!     })
//!     .confirm_restart(|| {
//!         // e.g. only restart when the application is idle
//!         true
//!     });
//!
//! // Keep the updater for the process lifetime (or call `updater.stop()`).
//! let updater = manage(config)?;
//! # let _ = updater;
//! # Ok(())
//! # }
//! ```
//!
//! # Publishing
//!
//! The server side is any static file host: upload the new build to the
//! configured URL and its detached 64-byte Ed25519 signature to the same URL
//! with `.ed25519` appended, atomically. The `Last-Modified` header decides
//! whether clients consider the build newer than what they run.
//!
//! # Logging
//!
//! Diagnostics go through [`tracing`]: skipped updates at `debug`, declined
//! confirmations and scheduler wakeups at `info`, swallowed background
//! check failures at `error`. Install any subscriber to see them; with none
//! installed the crate is silent.

pub mod apply;
pub mod error;
pub mod patch;
pub mod platform;
pub mod progress;
pub mod schedule;
pub mod source;
pub mod updater;
pub mod verify;
pub mod version;

pub use apply::{ApplyOptions, apply, check_permissions};
pub use error::UpdateError;
pub use patch::{BsDiffPatcher, Patcher};
pub use progress::{ProgressCallback, ProgressStream};
pub use schedule::{Repeating, Schedule, ScheduleAt, TriggerOffset, delay_until_next};
pub use source::{Source, UpdateStream, http::HttpSource};
pub use updater::{
    Config, ExitCallback, RestartConfirmCallback, Updater, UpgradeConfirmCallback, manage,
    manual_update,
};
pub use verify::{
    DsaVerifier, EcdsaVerifier, Ed25519Verifier, HashKind, PublicKey, RsaVerifier, Verifier,
};
pub use version::Version;

// The key types in the public API come from ed25519-dalek; re-exported so
// applications don't have to pin a matching version themselves.
pub use ed25519_dalek;
