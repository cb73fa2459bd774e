use crate::{game, hashing};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Distribution channel of the installed game. The channel decides the
/// launch mechanism and whether the doorstop loader must be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Platform {
    #[default]
    Steam,
    Epic,
    Itch,
    Unknown,
}

impl Platform {
    pub fn label(self) -> &'static str {
        match self {
            Platform::Steam => "Steam",
            Platform::Epic => "Epic Games Store",
            Platform::Itch => "itch.io",
            Platform::Unknown => "unknown",
        }
    }

    /// itch.io builds load plugins from their own folder; everything else
    /// needs the doorstop shim.
    pub fn needs_launch_patch(self) -> bool {
        !matches!(self, Platform::Itch)
    }
}

/// Classify an installation directory. Pure: no side effects, so callers
/// rerun it whenever the root changes and after every install or uninstall
/// (those write and remove marker files).
///
/// Order matters: the Epic marker DLL is checked first, then the reference
/// file hash separates Steam from itch.io. A missing reference file means we
/// cannot tell the channel at all.
pub fn classify(root: &Path, reference_hash: &str) -> Platform {
    if root.join(game::EPIC_MARKER_RELATIVE).exists() {
        return Platform::Epic;
    }

    let reference = root.join(game::REFERENCE_FILE_RELATIVE);
    if !reference.exists() {
        return Platform::Unknown;
    }

    match hashing::hash_file(&reference) {
        Ok(actual) if actual.eq_ignore_ascii_case(reference_hash) => Platform::Steam,
        _ => Platform::Itch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing;
    use std::fs;
    use tempfile::TempDir;

    fn game_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(game::GAME_EXE), b"mz").unwrap();
        dir
    }

    #[test]
    fn epic_marker_wins() {
        let dir = game_dir();
        let marker = dir.path().join(game::EPIC_MARKER_RELATIVE);
        fs::create_dir_all(marker.parent().unwrap()).unwrap();
        fs::write(&marker, b"egs").unwrap();
        // Marker outranks the reference hash even when that hash matches.
        let reference = dir.path().join(game::REFERENCE_FILE_RELATIVE);
        fs::write(&reference, b"unity").unwrap();
        let hash = hashing::hash_file(&reference).unwrap();
        assert_eq!(classify(dir.path(), &hash), Platform::Epic);
    }

    #[test]
    fn matching_reference_hash_is_steam() {
        let dir = game_dir();
        let reference = dir.path().join(game::REFERENCE_FILE_RELATIVE);
        fs::create_dir_all(reference.parent().unwrap()).unwrap();
        fs::write(&reference, b"unity").unwrap();
        let hash = hashing::hash_file(&reference).unwrap();
        assert_eq!(classify(dir.path(), &hash.to_uppercase()), Platform::Steam);
    }

    #[test]
    fn mismatched_reference_hash_is_itch() {
        let dir = game_dir();
        let reference = dir.path().join(game::REFERENCE_FILE_RELATIVE);
        fs::create_dir_all(reference.parent().unwrap()).unwrap();
        fs::write(&reference, b"modified").unwrap();
        assert_eq!(classify(dir.path(), "abc123"), Platform::Itch);
    }

    #[test]
    fn missing_reference_file_is_unknown() {
        let dir = game_dir();
        assert_eq!(classify(dir.path(), "abc123"), Platform::Unknown);
    }
}
