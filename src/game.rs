use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use sysinfo::{ProcessRefreshKind, RefreshKind, System};

pub const GAME_NAME: &str = "Among Us";
pub const GAME_EXE: &str = "Among Us.exe";
pub const PROCESS_NAME: &str = "Among Us";
pub const STEAM_LAUNCH_URI: &str = "steam://run/945360";
pub const EPIC_LAUNCH_URI: &str = "com.epicgames.launcher://apps/33956bcb55d4452d8c47e16b94e294bd%3A729a86a5146640a2ace9e8c595414c56%3A963137e4c29d4c79a81323b8fab03a40?action=launch&silent=true";

/// Plugin shipped only through the Epic Games Store build.
pub const EPIC_MARKER_RELATIVE: &str = "Among Us_Data/Plugins/x86/GfxPluginEGS.dll";
/// Unity resource file whose hash separates the Steam build from itch.io.
pub const REFERENCE_FILE_RELATIVE: &str = "Among Us_Data/globalgamemanagers";

pub const PLUGIN_DIR_RELATIVE: &str = "BepInEx/plugins";
pub const CONFIG_DIR_RELATIVE: &str = "BepInEx/config";

/// Everything the loader drops into the game root. Teardown removes exactly
/// this list, nothing else.
pub const UNINSTALL_PATHS: &[&str] = &[
    "BepInEx",
    "dotnet",
    ".doorstop_version",
    "changelog.txt",
    "doorstop_config.ini",
    "winhttp.dll",
];

pub fn verify_install_dir(path: &Path) -> bool {
    path.is_dir() && path.join(GAME_EXE).is_file()
}

/// Locate the game: a live process's executable directory first, then the
/// Steam library folders. Returns only directories that pass
/// `verify_install_dir`.
pub fn locate_install() -> Option<PathBuf> {
    if let Some(path) = path_from_process() {
        if verify_install_dir(&path) {
            return Some(path);
        }
    }
    let path = path_from_steam_libraries()?;
    verify_install_dir(&path).then_some(path)
}

fn path_from_process() -> Option<PathBuf> {
    let system =
        System::new_with_specifics(RefreshKind::new().with_processes(ProcessRefreshKind::new()));
    let path = system
        .processes_by_name(PROCESS_NAME)
        .next()
        .and_then(|process| process.exe())
        .and_then(Path::parent)
        .map(Path::to_path_buf);
    path
}

fn path_from_steam_libraries() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs_home() {
        candidates.push(home.join(".local/share/Steam"));
        candidates.push(home.join(".steam/steam"));
    }
    if cfg!(windows) {
        candidates.push(PathBuf::from("C:\\Program Files (x86)\\Steam"));
    }

    let mut libraries = Vec::new();
    for base in candidates {
        let vdf = base.join("steamapps/libraryfolders.vdf");
        if vdf.exists() {
            if let Ok(paths) = parse_steam_library_paths(&vdf) {
                libraries.extend(paths);
            }
        }
        libraries.push(base);
    }

    for lib in libraries {
        let candidate = lib.join("steamapps/common").join(GAME_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

fn parse_steam_library_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(path).context("read libraryfolders.vdf")?;
    let mut paths = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if !line.contains("\"path\"") {
            continue;
        }

        let parts: Vec<&str> = line.split('"').collect();
        if parts.len() >= 4 {
            let path = parts[3].replace("\\\\", "\\");
            paths.push(PathBuf::from(path));
        }
    }

    Ok(paths)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
