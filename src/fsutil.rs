// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Atomic file replacement.
//!
//! Readers of a replaced file (nginx, TLS termination) see either the old or the
//! new content, never a partial write: content goes to a temporary file in the
//! target directory, is flushed to disk, then renamed over the target.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `path` with `contents`, creating parent directories.
///
/// When `private` is set the file is created with mode 0600 on Unix.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or the file cannot be
/// written, synced or renamed.
pub fn atomic_write(path: &Path, contents: &[u8], private: bool) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if private { 0o600 } else { 0o644 };
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
#[path = "fsutil_tests.rs"]
mod fsutil_tests;
