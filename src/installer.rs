use crate::{
    error::LauncherError,
    hashing::{self, FileStatus},
    manifest::{FileHashEntry, PluginEntry, ZipRef},
    transport::Transport,
};
use filetime::{set_file_mtime, FileTime};
use std::{
    collections::HashSet,
    fs,
    path::Path,
};
use time::{Date, Month, Time as TimeOfDay};
use walkdir::WalkDir;

/// Monotone ratio in [0,1] for the current operation.
pub type ProgressFn<'a> = &'a mut dyn FnMut(f32);

/// Downloads and applies pack content. Installs are authoritative: whatever
/// an archive or plugin fetch carries overwrites local state unconditionally.
pub struct PackInstaller<'a> {
    transport: &'a dyn Transport,
    cache_dir: &'a Path,
}

impl<'a> PackInstaller<'a> {
    pub fn new(transport: &'a dyn Transport, cache_dir: &'a Path) -> Self {
        Self {
            transport,
            cache_dir,
        }
    }

    /// Download (or reuse a hash-matching cached copy of) one archive and
    /// extract it into `dest_dir`. The cached copy makes a repeated install
    /// with an unchanged manifest cost zero network fetches.
    pub fn install_archive(
        &self,
        name: &str,
        dest_dir: &Path,
        zip_ref: &ZipRef,
        progress: ProgressFn<'_>,
    ) -> Result<(), LauncherError> {
        let archive_path = self.cache_dir.join(name);

        let cached_current = archive_path.exists()
            && hashing::file_status(&archive_path, &zip_ref.hash) == FileStatus::Current;
        if cached_current {
            tracing::info!("{name}: cached archive matches, skipping download");
        } else {
            tracing::info!("{name}: downloading from {}", zip_ref.link);
            self.transport.download(&zip_ref.link, &archive_path)?;
            let actual = hashing::hash_file(&archive_path)
                .map_err(|err| LauncherError::Archive(err.to_string()))?;
            if !actual.eq_ignore_ascii_case(&zip_ref.hash) {
                return Err(LauncherError::IntegrityMismatch {
                    path: archive_path,
                    expected: zip_ref.hash.clone(),
                    actual,
                });
            }
        }

        extract_zip(&archive_path, dest_dir, progress)
    }

    /// Fetch every plugin whose local copy is missing or stale. Entries are
    /// checked independently, but the first fetch failure aborts: a partial
    /// plugin set must not pass a later evaluation as launch-ready.
    pub fn install_plugins(
        &self,
        plugin_dir: &Path,
        entries: &[PluginEntry],
    ) -> Result<(), LauncherError> {
        fs::create_dir_all(plugin_dir)
            .map_err(|err| LauncherError::Archive(format!("create plugin dir: {err}")))?;

        for entry in entries {
            let path = plugin_dir.join(&entry.name);
            if hashing::file_status(&path, &entry.hash) == FileStatus::Current {
                continue;
            }
            tracing::info!("downloading plugin {}", entry.name);
            self.transport.download(&entry.download_url, &path)?;
        }
        Ok(())
    }

    /// Repair game files against the secondary hash list, file-by-file from
    /// the extracted core archive, without touching anything that already
    /// matches.
    pub fn repair_game_files(
        &self,
        root: &Path,
        cache_root: &Path,
        entries: &[FileHashEntry],
        progress: ProgressFn<'_>,
    ) -> Result<(), LauncherError> {
        let total = entries.len();
        for (index, entry) in entries.iter().enumerate() {
            let dest = root.join(&entry.relative_path);
            if hashing::file_status(&dest, &entry.hash) != FileStatus::Current {
                let source = cache_root.join(&entry.relative_path);
                if !source.exists() {
                    return Err(LauncherError::NotFound(source));
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|err| {
                        LauncherError::Archive(format!("create {:?}: {err}", parent))
                    })?;
                }
                fs::copy(&source, &dest).map_err(|err| {
                    LauncherError::Archive(format!("repair {:?}: {err}", dest))
                })?;
            }
            if total != 0 {
                progress((index + 1) as f32 / total as f32);
            }
        }
        Ok(())
    }
}

/// True when the plugin tree holds any DLL the manifest does not know about,
/// meaning a user's own mods would be clobbered by an install.
pub fn has_foreign_plugins(plugin_dir: &Path, entries: &[PluginEntry]) -> bool {
    if !plugin_dir.is_dir() {
        return false;
    }
    let known: HashSet<String> = entries
        .iter()
        .map(|entry| entry.hash.to_lowercase())
        .collect();

    WalkDir::new(plugin_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|item| {
            item.file_type().is_file()
                && item
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dll"))
        })
        .any(|item| match hashing::hash_file(item.path()) {
            Ok(hash) => !known.contains(&hash.to_lowercase()),
            Err(_) => false,
        })
}

fn extract_zip(
    archive_path: &Path,
    dest: &Path,
    progress: ProgressFn<'_>,
) -> Result<(), LauncherError> {
    let file = fs::File::open(archive_path)
        .map_err(|err| LauncherError::Archive(format!("open {:?}: {err}", archive_path)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|err| LauncherError::Archive(format!("read {:?}: {err}", archive_path)))?;

    let total = archive.len();
    for index in 0..total {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| LauncherError::Archive(format!("zip entry: {err}")))?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };

        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|err| LauncherError::Archive(format!("create zip dir: {err}")))?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| LauncherError::Archive(format!("create zip dir: {err}")))?;
            }
            let mut out_file = fs::File::create(&out_path)
                .map_err(|err| LauncherError::Archive(format!("write zip entry: {err}")))?;
            std::io::copy(&mut entry, &mut out_file)
                .map_err(|err| LauncherError::Archive(format!("extract zip entry: {err}")))?;
            if let Some(dt) = entry.last_modified() {
                if let Some(mtime) = zip_time_to_unix(dt) {
                    let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
                }
            }
        }

        // total != 0 inside the loop by construction
        progress((index + 1) as f32 / total as f32);
    }

    Ok(())
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    Some(date.with_time(time).assume_utc().unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::FakeTransport;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, content) in files {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn sha256(bytes: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        format!("{:x}", Sha256::digest(bytes))
    }

    #[test]
    fn second_install_skips_download() {
        let cache = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = zip_bytes(&[("BepInEx/core/Core.dll", b"core")]);
        let zip_ref = ZipRef {
            link: "https://example.com/core.zip".to_string(),
            hash: sha256(&archive),
        };
        let transport =
            FakeTransport::new().serve("https://example.com/core.zip", archive);
        let installer = PackInstaller::new(&transport, cache.path());

        for _ in 0..2 {
            installer
                .install_archive("core.zip", dest.path(), &zip_ref, &mut |_| {})
                .unwrap();
        }

        assert_eq!(transport.hits_for("https://example.com/core.zip"), 1);
        assert!(dest.path().join("BepInEx/core/Core.dll").exists());
    }

    #[test]
    fn extraction_progress_is_monotone_and_complete() {
        let cache = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = zip_bytes(&[("a.txt", b"a"), ("b.txt", b"b"), ("c/d.txt", b"d")]);
        let zip_ref = ZipRef {
            link: "https://example.com/extra.zip".to_string(),
            hash: sha256(&archive),
        };
        let transport =
            FakeTransport::new().serve("https://example.com/extra.zip", archive);
        let installer = PackInstaller::new(&transport, cache.path());

        let mut seen = Vec::new();
        installer
            .install_archive("extra.zip", dest.path(), &zip_ref, &mut |ratio| {
                seen.push(ratio)
            })
            .unwrap();

        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn install_overwrites_existing_files() {
        let cache = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("a.txt"), b"stale local edit").unwrap();

        let archive = zip_bytes(&[("a.txt", b"authoritative")]);
        let zip_ref = ZipRef {
            link: "https://example.com/pack.zip".to_string(),
            hash: sha256(&archive),
        };
        let transport =
            FakeTransport::new().serve("https://example.com/pack.zip", archive);
        PackInstaller::new(&transport, cache.path())
            .install_archive("pack.zip", dest.path(), &zip_ref, &mut |_| {})
            .unwrap();

        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"authoritative");
    }

    #[test]
    fn corrupt_download_is_an_integrity_error() {
        let cache = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = zip_bytes(&[("a.txt", b"a")]);
        let zip_ref = ZipRef {
            link: "https://example.com/pack.zip".to_string(),
            hash: "0000000000000000000000000000000000000000000000000000000000000000"
                .to_string(),
        };
        let transport =
            FakeTransport::new().serve("https://example.com/pack.zip", archive);
        let result = PackInstaller::new(&transport, cache.path()).install_archive(
            "pack.zip",
            dest.path(),
            &zip_ref,
            &mut |_| {},
        );
        assert!(matches!(
            result,
            Err(LauncherError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn plugins_current_are_not_refetched() {
        let cache = TempDir::new().unwrap();
        let plugins = TempDir::new().unwrap();
        fs::write(plugins.path().join("Pack.dll"), b"v2").unwrap();

        let entries = vec![
            PluginEntry {
                name: "Pack.dll".to_string(),
                hash: sha256(b"v2"),
                download_url: "https://example.com/Pack.dll".to_string(),
            },
            PluginEntry {
                name: "Other.dll".to_string(),
                hash: sha256(b"other"),
                download_url: "https://example.com/Other.dll".to_string(),
            },
        ];
        let transport = FakeTransport::new()
            .serve("https://example.com/Pack.dll", b"v2".to_vec())
            .serve("https://example.com/Other.dll", b"other".to_vec());
        PackInstaller::new(&transport, cache.path())
            .install_plugins(plugins.path(), &entries)
            .unwrap();

        assert_eq!(transport.hits_for("https://example.com/Pack.dll"), 0);
        assert_eq!(transport.hits_for("https://example.com/Other.dll"), 1);
    }

    #[test]
    fn plugin_fetch_failure_fails_fast() {
        let cache = TempDir::new().unwrap();
        let plugins = TempDir::new().unwrap();
        let entries = vec![PluginEntry {
            name: "Pack.dll".to_string(),
            hash: "deadbeef".to_string(),
            download_url: "https://example.com/missing".to_string(),
        }];
        let transport = FakeTransport::new();
        let result = PackInstaller::new(&transport, cache.path())
            .install_plugins(plugins.path(), &entries);
        assert!(matches!(result, Err(LauncherError::Transport(_))));
    }

    #[test]
    fn repair_copies_only_mismatched_files() {
        let cache = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let cached_core = cache.path().join("core");
        fs::create_dir_all(cached_core.join("BepInEx/core")).unwrap();
        fs::write(cached_core.join("BepInEx/core/Core.dll"), b"good").unwrap();
        fs::create_dir_all(root.path().join("BepInEx/core")).unwrap();
        fs::write(root.path().join("BepInEx/core/Core.dll"), b"bad").unwrap();

        let entries = vec![FileHashEntry {
            relative_path: "BepInEx/core/Core.dll".to_string(),
            hash: sha256(b"good"),
        }];
        let transport = FakeTransport::new();
        PackInstaller::new(&transport, cache.path())
            .repair_game_files(root.path(), &cached_core, &entries, &mut |_| {})
            .unwrap();

        assert_eq!(
            fs::read(root.path().join("BepInEx/core/Core.dll")).unwrap(),
            b"good"
        );
    }

    #[test]
    fn foreign_plugins_detected_by_hash() {
        let plugins = TempDir::new().unwrap();
        fs::write(plugins.path().join("Pack.dll"), b"known").unwrap();
        let entries = vec![PluginEntry {
            name: "Pack.dll".to_string(),
            hash: sha256(b"known"),
            download_url: String::new(),
        }];
        assert!(!has_foreign_plugins(plugins.path(), &entries));

        fs::write(plugins.path().join("UserMod.dll"), b"foreign").unwrap();
        assert!(has_foreign_plugins(plugins.path(), &entries));
    }
}
