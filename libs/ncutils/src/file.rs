// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! File utilities

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Create `path` and any missing parents.
///
/// Another process creating the directory first is not an error.
pub fn ensure_dir(path: &Path) -> Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("failed to create directory: {}", path.display()))
        }
    }
}

/// Replace the contents of `path` through a temporary sibling and a rename.
///
/// Permissions of an existing file are carried over to the new one.
pub fn safe_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;

    if let Ok(meta) = std::fs::metadata(path) {
        std::fs::set_permissions(&temp_path, meta.permissions())
            .with_context(|| format!("failed to copy permissions to {}", temp_path.display()))?;
    }

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("failed to rename {} to {}", temp_path.display(), path.display()))?;

    Ok(())
}

/// Like [`safe_write`], but the file is only ever readable by the owner.
pub fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);
    match std::fs::remove_file(&temp_path) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            return Err(e).with_context(|| format!("failed to remove stale {}", temp_path.display()));
        }
        _ => {}
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&temp_path)
        .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
    file.write_all(content)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;
    drop(file);

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("failed to rename {} to {}", temp_path.display(), path.display()))?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
