//! Crash-safe file replacement shared by every file-backed store.
//!
//! Content is written to a temporary file in the target's directory, synced,
//! restricted to the owner and then renamed over the target. A reader sees
//! either the old or the new content, never a truncated file.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{KeywardError, Result};

/// Permission mode for credential directories (owner rwx only).
pub const DIR_MODE: u32 = 0o700;

/// Permission mode for credential files (owner rw only).
pub const FILE_MODE: u32 = 0o600;

/// Atomically replaces `path` with `contents`, owner-only permissions.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the
/// temporary file cannot be written or renamed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_private_dir(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    set_mode(temp.path(), FILE_MODE)?;

    temp.persist(path)
        .map_err(|e| KeywardError::Io(e.error))?;
    Ok(())
}

/// Removes `path`, treating an already-absent file as success.
///
/// # Errors
///
/// Returns an error for any failure other than `NotFound`.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reads `path`, returning `None` when it does not exist.
///
/// # Errors
///
/// Returns an error for any failure other than `NotFound`.
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        set_mode(dir, DIR_MODE)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
