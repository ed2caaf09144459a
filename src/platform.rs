//! Platform-specific pieces of the update machinery.
//!
//! Everything here is small but load-bearing: resolving the true on-disk
//! path of the running executable (symlinks resolved, so the swap happens on
//! the real file), probing its modification time for the default reference
//! version, and the Windows hidden-attribute fallback used when the shelved
//! `.old` image cannot be deleted because the loader still maps it.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Mode bits applied to the staged replacement when the caller does not
/// specify any. Ignored on Windows.
pub const DEFAULT_EXECUTABLE_MODE: u32 = 0o755;

/// Absolute, symlink-resolved path of the running executable.
///
/// The updater swaps the file this resolves to, not the symlink the process
/// may have been launched through.
pub fn current_exe_path() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    std::fs::canonicalize(exe)
}

/// Modification time of the running executable, used as the local reference
/// version when the application does not know its own.
pub fn last_modified_executable() -> io::Result<DateTime<Utc>> {
    let exe = current_exe_path()?;
    let metadata = std::fs::metadata(exe)?;
    Ok(metadata.modified()?.into())
}

/// Mark a file as hidden.
///
/// On Windows this sets `FILE_ATTRIBUTE_HIDDEN`; it is the fallback for the
/// shelved `.old` executable, which cannot be removed while the old image is
/// still mapped by the running process. Elsewhere the dot-prefixed name is
/// already hidden by convention and this is a no-op.
#[cfg(windows)]
pub fn hide_file(path: &Path) -> io::Result<()> {
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{FILE_ATTRIBUTE_HIDDEN, SetFileAttributesW};

    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
    // SAFETY: `wide` is a valid, NUL-terminated UTF-16 string for the whole call.
    let ok = unsafe { SetFileAttributesW(wide.as_ptr(), FILE_ATTRIBUTE_HIDDEN) };
    if ok == 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
}

/// See the Windows variant; nothing to do on platforms where a leading dot
/// already hides the file.
#[cfg(not(windows))]
pub fn hide_file(_path: &Path) -> io::Result<()> {
    Ok(())
}
