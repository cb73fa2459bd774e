use crate::{error::LauncherError, transport::Transport};
use serde::{Deserialize, Serialize};

pub const MANIFEST_URL: &str = "https://www.xtracube.dev/assets/js/launcherData.json";
pub const HASH_LIST_URL: &str = "https://www.xtracube.dev/assets/js/hashes.json";

/// Remote descriptor of the current pack version. Immutable once fetched;
/// a failed fetch falls back to the copy persisted in local config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackManifest {
    pub latest_version: String,
    pub update_link: String,
    pub package: PackArchives,
    pub plugins: Vec<PluginEntry>,
    pub reference_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackArchives {
    pub bepin_core: ZipRef,
    pub extra_data: ZipRef,
}

/// A downloadable archive and its expected content hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipRef {
    pub link: String,
    pub hash: String,
}

/// One pack file and where to fetch it individually, so a single stale
/// plugin can be repaired without pulling the whole archive again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginEntry {
    pub name: String,
    pub hash: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
}

/// Secondary list covering files inside the game itself, repaired
/// file-by-file from the cached core archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHashEntry {
    pub relative_path: String,
    pub hash: String,
}

pub fn fetch_manifest(transport: &dyn Transport) -> Result<PackManifest, LauncherError> {
    let body = transport.fetch_text(MANIFEST_URL)?;
    serde_json::from_str(&body).map_err(|err| LauncherError::Transport(err.to_string()))
}

pub fn fetch_hash_list(transport: &dyn Transport) -> Result<Vec<FileHashEntry>, LauncherError> {
    let body = transport.fetch_text(HASH_LIST_URL)?;
    serde_json::from_str(&body).map_err(|err| LauncherError::Transport(err.to_string()))
}
