//! Version metadata for the running executable and remote builds.

use chrono::{DateTime, Utc};

use crate::error::UpdateError;
use crate::platform;

/// Version information for an executable build.
///
/// The `date` field is the authoritative one for ordering: an update is
/// triggered exactly when the remote build's date is strictly newer than the
/// local reference date. `number` and `build` are carried for applications
/// that know their own version metadata but are never compared by this crate.
///
/// A `date` of `None` means "unknown" and orders strictly older than any
/// known date, so a source that reports any date at all will always look
/// newer than a default [`Version`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    /// Opaque version string, if the application tracks one.
    pub number: String,
    /// Build counter, if the application tracks one.
    pub build: i64,
    /// Last-updated instant; usually the build or publication time. For the
    /// local reference this defaults to the executable's mtime.
    pub date: Option<DateTime<Utc>>,
}

impl Version {
    /// A version carrying only a date, the common case for both the HTTP
    /// source (`Last-Modified`) and the executable-mtime fallback.
    pub fn from_date(date: DateTime<Utc>) -> Self {
        Self { date: Some(date), ..Self::default() }
    }

    /// The reference version of the running executable, derived from the
    /// modification time of the (symlink-resolved) on-disk binary.
    pub fn for_current_executable() -> Result<Self, UpdateError> {
        let mtime = platform::last_modified_executable()?;
        Ok(Self::from_date(mtime))
    }

    /// Whether `self` should trigger an update over `other`. Unknown dates
    /// never win a comparison.
    pub(crate) fn is_newer_than(&self, other: &Version) -> bool {
        match (self.date, other.date) {
            (Some(remote), Some(local)) => remote > local,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
