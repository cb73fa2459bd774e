use crate::{backup::{self, BackupSet}, game};
use anyhow::{Context, Result};
use std::{fs, path::Path};

pub const DOORSTOP_CONFIG: &str = "doorstop_config.ini";
pub const LOADER_SHIM: &str = "winhttp.dll";
const CHEAT_SHIM: &str = "version.dll";

/// Which of the two mutually exclusive revert branches ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    Restored,
    TornDown,
}

/// Patch the game so doorstop boots the pack's managed runtime on launch.
/// Only called for channels without a native plugin folder; the shim comes
/// from the assembled pack tree, and a pre-existing doorstop config is
/// staged aside exactly once before ours is written.
pub fn apply_launch_patch(root: &Path, pack_dir: &Path, backups: &mut BackupSet) -> Result<()> {
    let shim = pack_dir.join(LOADER_SHIM);
    fs::copy(&shim, root.join(LOADER_SHIM))
        .with_context(|| format!("copy loader shim from {:?}", shim))?;

    let config_path = root.join(DOORSTOP_CONFIG);
    backups.stage(&config_path)?;
    fs::write(&config_path, doorstop_config(pack_dir)).context("write doorstop config")?;

    // Known cheat loader also hooks version.dll; park it for the session.
    let cheat = root.join(CHEAT_SHIM);
    if cheat.exists() {
        let _ = fs::rename(&cheat, root.join("version.dll.no"));
    }

    Ok(())
}

/// Undo the launch patch. With a staged config backup the original comes
/// back byte-for-byte; without one the game was clean before us, so the
/// whole uninstall list is torn down. Exactly one branch runs.
pub fn revert_launch_patch(root: &Path) -> Result<RevertOutcome> {
    let config_path = root.join(DOORSTOP_CONFIG);
    if backup::restore_path(&config_path)? {
        fs::remove_file(root.join(LOADER_SHIM)).ok();
        return Ok(RevertOutcome::Restored);
    }

    teardown(root)?;
    Ok(RevertOutcome::TornDown)
}

/// Remove every path the pack ever writes into the game root.
pub fn teardown(root: &Path) -> Result<()> {
    for name in game::UNINSTALL_PATHS {
        backup::remove_any(&root.join(name))?;
    }
    Ok(())
}

/// Full uninstall: restore the user's own plugin and config subtrees when
/// they were staged aside by an earlier install, else tear everything down.
pub fn uninstall(root: &Path) -> Result<RevertOutcome> {
    let plugins = root.join(game::PLUGIN_DIR_RELATIVE);
    let config = root.join(game::CONFIG_DIR_RELATIVE);

    if backup::has_backup(&plugins) || backup::has_backup(&config) {
        backup::restore_path(&plugins)?;
        backup::restore_path(&config)?;
        backup::restore_path(&root.join(DOORSTOP_CONFIG))?;
        fs::remove_file(root.join(LOADER_SHIM)).ok();
        Ok(RevertOutcome::Restored)
    } else {
        teardown(root)?;
        Ok(RevertOutcome::TornDown)
    }
}

fn doorstop_config(pack_dir: &Path) -> String {
    let target_assembly = pack_dir.join("BepInEx/core/BepInEx.Unity.IL2CPP.dll");
    let coreclr_dir = pack_dir.join("dotnet");
    let coreclr_path = coreclr_dir.join("coreclr.dll");
    format!(
        "[General]\n\
         enabled = true\n\
         target_assembly = {}\n\
         \n\
         [Il2Cpp]\n\
         coreclr_path = {}\n\
         corlib_dir = {}\n",
        target_assembly.display(),
        coreclr_path.display(),
        coreclr_dir.display(),
    )
}
