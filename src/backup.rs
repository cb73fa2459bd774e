use anyhow::{Context, Result};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

/// Backups staged during one activation cycle. Paths are staged at most
/// once (a second stage of the same path is a no-op) and the whole set must
/// be resolved, restored or discarded, before the controller goes idle
/// again; an unresolved set would mask the next install behind stale
/// backups.
///
/// Staging renames the original aside, so restore is byte-for-byte by
/// construction. The on-disk names (`<file>.bak`, `<dir>_backup`) are
/// stable, which lets a later process run find and resolve backups it did
/// not create.
#[derive(Debug, Default)]
pub struct BackupSet {
    // (original, staged-aside) pairs
    entries: Vec<(PathBuf, PathBuf)>,
}

impl BackupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move `original` aside if it exists and has no backup yet.
    pub fn stage(&mut self, original: &Path) -> Result<()> {
        let aside = backup_path(original);
        if !original.exists() || aside.exists() {
            return Ok(());
        }
        fs::rename(original, &aside)
            .with_context(|| format!("stage backup of {:?}", original))?;
        self.entries.push((original.to_path_buf(), aside));
        Ok(())
    }

    /// Put every staged original back, deleting whatever occupies its path.
    pub fn restore(self) -> Result<()> {
        for (original, aside) in self.entries {
            remove_any(&original)?;
            fs::rename(&aside, &original)
                .with_context(|| format!("restore backup onto {:?}", original))?;
        }
        Ok(())
    }

    /// Drop the staged copies; the overwriting content stays authoritative.
    pub fn discard(self) -> Result<()> {
        for (_, aside) in self.entries {
            remove_any(&aside)?;
        }
        Ok(())
    }
}

pub fn backup_path(original: &Path) -> PathBuf {
    if original.is_dir() {
        let mut name = OsString::from(original.file_name().unwrap_or_default());
        name.push("_backup");
        original.with_file_name(name)
    } else {
        let mut name = OsString::from(original.file_name().unwrap_or_default());
        name.push(".bak");
        original.with_file_name(name)
    }
}

pub fn has_backup(original: &Path) -> bool {
    dir_backup_path(original).exists() || file_backup_path(original).exists()
}

/// Restore a single path from its on-disk backup, whichever kind exists.
/// Returns false when there is nothing to restore.
pub fn restore_path(original: &Path) -> Result<bool> {
    for aside in [dir_backup_path(original), file_backup_path(original)] {
        if aside.exists() {
            remove_any(original)?;
            fs::rename(&aside, original)
                .with_context(|| format!("restore backup onto {:?}", original))?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn dir_backup_path(original: &Path) -> PathBuf {
    let mut name = OsString::from(original.file_name().unwrap_or_default());
    name.push("_backup");
    original.with_file_name(name)
}

fn file_backup_path(original: &Path) -> PathBuf {
    let mut name = OsString::from(original.file_name().unwrap_or_default());
    name.push(".bak");
    original.with_file_name(name)
}

pub fn remove_any(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("remove {:?}", path))?;
    } else if path.exists() {
        fs::remove_file(path).with_context(|| format!("remove {:?}", path))?;
    }
    Ok(())
}
