use crate::{manifest::PackManifest, platform::Platform};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Persisted launcher state. `installationPath` is the only source-of-truth
/// field; the variant is re-derived from disk on every load and stored only
/// as a hint, and `packageData` is the manifest fallback for offline starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherConfig {
    pub installation_path: PathBuf,
    pub distribution_variant: Platform,
    pub package_data: Option<PackManifest>,
}

impl LauncherConfig {
    /// Default-constructs on absence or corruption; a broken config file
    /// must never block startup.
    pub fn load_or_create() -> Result<Self> {
        let dirs = DataDirs::resolve()?;
        fs::create_dir_all(&dirs.data_dir).context("create launcher data dir")?;
        let path = dirs.config_path();
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read launcher config")?;
            match serde_json::from_str(&raw) {
                Ok(config) => return Ok(config),
                Err(err) => {
                    tracing::warn!("launcher config unreadable, starting fresh: {err}");
                }
            }
        }
        Ok(LauncherConfig::default())
    }

    pub fn save(&self) -> Result<()> {
        let dirs = DataDirs::resolve()?;
        fs::create_dir_all(&dirs.data_dir).context("create launcher data dir")?;
        let raw = serde_json::to_string_pretty(self).context("serialize launcher config")?;
        fs::write(dirs.config_path(), raw).context("write launcher config")?;
        Ok(())
    }
}

/// Process-local data layout: downloaded archives under `cache/`, the
/// assembled pack tree under `pack/`, config alongside.
#[derive(Debug, Clone)]
pub struct DataDirs {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub pack_dir: PathBuf,
}

impl DataDirs {
    pub fn resolve() -> Result<Self> {
        let base = BaseDirs::new().context("resolve home dir")?;
        let data_dir = base.data_local_dir().join("latchkey");
        Ok(Self::rooted(data_dir))
    }

    pub fn rooted(data_dir: PathBuf) -> Self {
        let cache_dir = data_dir.join("cache");
        let pack_dir = data_dir.join("pack");
        Self {
            data_dir,
            cache_dir,
            pack_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).context("create cache dir")?;
        fs::create_dir_all(&self.pack_dir).context("create pack dir")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips() {
        let config = LauncherConfig {
            installation_path: PathBuf::from("/games/Among Us"),
            distribution_variant: Platform::Epic,
            package_data: None,
        };
        let raw = serde_json::to_string(&config).unwrap();
        assert!(raw.contains("installationPath"));
        assert!(raw.contains("distributionVariant"));
        let back: LauncherConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.installation_path, config.installation_path);
        assert_eq!(back.distribution_variant, Platform::Epic);
    }

    #[test]
    fn corrupt_config_shape_rejected_gracefully() {
        let parsed: Result<LauncherConfig, _> = serde_json::from_str("{\"installationPath\": 7}");
        assert!(parsed.is_err());
    }
}
