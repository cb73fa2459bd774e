use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io::Read,
    path::Path,
};

/// Verdict for one local file measured against a manifest hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Missing,
    Stale,
    Current,
}

/// Sha256 over the full file content, lowercase hex. The whole file is
/// always read; plugin binaries are small and a partial read cannot prove
/// integrity.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {:?} for hashing", path))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compares case-insensitively: manifests have shipped both hex casings.
pub fn file_status(path: &Path, expected: &str) -> FileStatus {
    if !path.exists() {
        return FileStatus::Missing;
    }
    match hash_file(path) {
        Ok(actual) if actual.eq_ignore_ascii_case(expected) => FileStatus::Current,
        Ok(_) => FileStatus::Stale,
        Err(_) => FileStatus::Stale,
    }
}
