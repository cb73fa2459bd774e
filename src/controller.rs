use crate::{
    backup::BackupSet,
    config::{DataDirs, LauncherConfig},
    error::LauncherError,
    game,
    hashing::{self, FileStatus},
    installer::{self, PackInstaller},
    manifest::{self, FileHashEntry, PackManifest},
    patcher, platform,
    platform::Platform,
    supervisor::{self, PollBudget},
    transport::Transport,
};
use anyhow::{bail, Context, Result};
use std::{
    path::Path,
    sync::{
        mpsc::{Receiver, Sender},
        Arc,
    },
    thread,
};

/// The launcher's single source of truth. Actionable states name the one
/// thing `activate()` will do; `Loading` and `Running` double as the
/// re-entrancy guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Loading,
    Refresh,
    Install,
    Update,
    Launch,
    Running,
}

impl State {
    pub fn label(self) -> &'static str {
        match self {
            State::Loading => "Loading",
            State::Refresh => "Refresh",
            State::Install => "Install",
            State::Update => "Update",
            State::Launch => "Launch",
            State::Running => "Running",
        }
    }
}

/// Completion messages posted by worker threads. Workers never touch
/// controller state; they only send, and the owner thread applies.
pub enum Event {
    Progress(f32),
    InstallFinished(Result<(), LauncherError>),
    GameExited,
}

/// Owns the state machine and sequences verification, installs, launch
/// patching and process supervision. All mutation happens on the thread
/// that drains the event channel.
pub struct Controller {
    transport: Arc<dyn Transport>,
    pub config: LauncherConfig,
    dirs: DataDirs,
    manifest: PackManifest,
    hash_list: Option<Vec<FileHashEntry>>,
    state: State,
    launch_backups: Option<BackupSet>,
    poll_budget: PollBudget,
    pending_workers: usize,
    last_error: Option<String>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Controller {
    pub fn new(transport: Arc<dyn Transport>, config: LauncherConfig, dirs: DataDirs) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            transport,
            config,
            dirs,
            manifest: PackManifest::default(),
            hash_list: None,
            state: State::Loading,
            launch_backups: None,
            poll_budget: PollBudget::default(),
            pending_workers: 0,
            last_error: None,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Fetch the manifest (falling back to the persisted copy when the
    /// network or decode fails), then settle into the first stable state.
    pub fn startup(&mut self) -> Result<()> {
        self.dirs.ensure()?;

        match manifest::fetch_manifest(self.transport.as_ref()) {
            Ok(fetched) => {
                self.config.package_data = Some(fetched.clone());
                self.manifest = fetched;
            }
            Err(err) => match self.config.package_data.clone() {
                Some(cached) => {
                    tracing::warn!("manifest fetch failed, using cached copy: {err}");
                    self.manifest = cached;
                }
                None => {
                    bail!("manifest unavailable and no cached copy exists: {err}");
                }
            },
        }

        match manifest::fetch_hash_list(self.transport.as_ref()) {
            Ok(list) => self.hash_list = Some(list),
            Err(err) => {
                tracing::warn!("hash list unavailable, falling back to whole-archive installs: {err}");
                self.hash_list = None;
            }
        }

        self.evaluate();
        Ok(())
    }

    /// Re-derive the state from disk. Called after every mutation; the
    /// filesystem, not history, decides what the launcher may do next.
    pub fn evaluate(&mut self) {
        if !game::verify_install_dir(&self.config.installation_path) {
            match game::locate_install() {
                Some(path) => {
                    tracing::info!("located {} at {:?}", game::GAME_NAME, path);
                    self.config.installation_path = path;
                }
                None => {
                    tracing::info!("no {} installation found", game::GAME_NAME);
                    self.state = State::Refresh;
                    return;
                }
            }
        }

        let root = self.config.installation_path.clone();
        let variant = platform::classify(&root, &self.manifest.reference_hash);
        if variant == Platform::Unknown {
            tracing::warn!(
                "unrecognized distribution of {}; launching will use the executable directly",
                game::GAME_NAME
            );
        }
        self.config.distribution_variant = variant;

        let plugin_dir = root.join(game::PLUGIN_DIR_RELATIVE);
        if !plugin_dir.is_dir() {
            self.state = State::Install;
            return;
        }

        let mut any_missing = false;
        let mut any_stale = false;
        for entry in &self.manifest.plugins {
            match hashing::file_status(&plugin_dir.join(&entry.name), &entry.hash) {
                FileStatus::Missing => {
                    tracing::info!("missing {}", entry.name);
                    any_missing = true;
                }
                FileStatus::Stale => {
                    tracing::info!("out of date: {}", entry.name);
                    any_stale = true;
                }
                FileStatus::Current => {}
            }
        }

        self.state = if any_missing {
            State::Install
        } else if any_stale {
            State::Update
        } else {
            State::Launch
        };
    }

    /// The single externally triggered action, dispatched on the current
    /// state. `Loading` and `Running` swallow the trigger so no second
    /// activation can interleave with one in flight.
    pub fn activate(&mut self) {
        match self.state {
            State::Loading | State::Running => {}
            State::Refresh => {
                self.state = State::Loading;
                self.evaluate();
            }
            State::Install | State::Update => {
                self.state = State::Loading;
                self.start_install();
            }
            State::Launch => {
                self.state = State::Loading;
                if let Err(err) = self.start_launch() {
                    self.fail(err.to_string());
                    self.evaluate();
                }
            }
        }
    }

    /// Drain worker events until no worker is outstanding and the state is
    /// stable. Progress and completions are applied here, on the owner
    /// thread, and nowhere else.
    pub fn run_until_idle(&mut self) -> Result<()> {
        while self.pending_workers > 0 {
            let event = self.rx.recv().context("worker channel closed")?;
            self.handle_event(event);
        }
        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Progress(ratio) => {
                tracing::debug!("progress {:.0}%", ratio * 100.0);
            }
            Event::InstallFinished(result) => {
                self.pending_workers -= 1;
                match result {
                    Ok(()) => tracing::info!("pack install complete"),
                    // Recoverable classes show up again in the re-derived
                    // state; the rest need the user to see the message.
                    Err(err) if err.is_recoverable() => {
                        tracing::info!("install incomplete: {err}")
                    }
                    Err(err) => self.fail(format!("install failed: {err}")),
                }
                self.evaluate();
            }
            Event::GameExited => {
                self.pending_workers -= 1;
                tracing::info!("{} exited", game::GAME_NAME);
                self.finish_launch_cycle();
                self.evaluate();
            }
        }
    }

    /// Persist config once, on clean shutdown only.
    pub fn shutdown(self) -> Result<()> {
        self.config.save()
    }

    fn start_install(&mut self) {
        supervisor::kill_running();

        // Stage the user's own plugin and config subtrees before the pack
        // overwrites them. Staying on disk afterwards, the staged copies
        // double as the uninstall record.
        let root = self.config.installation_path.clone();
        let plugin_dir = root.join(game::PLUGIN_DIR_RELATIVE);
        if installer::has_foreign_plugins(&plugin_dir, &self.manifest.plugins) {
            let mut backups = BackupSet::new();
            let staged = backups
                .stage(&plugin_dir)
                .and_then(|_| backups.stage(&root.join(game::CONFIG_DIR_RELATIVE)));
            if let Err(err) = staged {
                self.fail(format!("could not back up existing plugins: {err}"));
                self.evaluate();
                return;
            }
            if !backups.is_empty() {
                tracing::info!("existing plugins staged aside for uninstall");
            }
            // Resolved at uninstall; the staged names are stable on disk.
            drop(backups);
        }

        let transport = self.transport.clone();
        let dirs = self.dirs.clone();
        let manifest = self.manifest.clone();
        let hash_list = self.hash_list.clone();
        let tx = self.tx.clone();

        self.pending_workers += 1;
        thread::spawn(move || {
            let result = run_install(transport.as_ref(), &dirs, &root, &manifest, &hash_list, &tx);
            let _ = tx.send(Event::InstallFinished(result));
        });
    }

    fn start_launch(&mut self) -> Result<()> {
        supervisor::kill_running();

        let root = self.config.installation_path.clone();
        let variant = self.config.distribution_variant;

        if variant.needs_launch_patch() {
            let mut backups = BackupSet::new();
            patcher::apply_launch_patch(&root, &self.dirs.pack_dir, &mut backups)?;
            self.launch_backups = Some(backups);
        }

        let tx = self.tx.clone();
        self.pending_workers += 1;
        self.state = State::Running;
        let launched = supervisor::launch(&root, variant, self.poll_budget, move || {
            let _ = tx.send(Event::GameExited);
        });

        if let Err(err) = launched {
            self.pending_workers -= 1;
            self.finish_launch_cycle();
            return Err(err.into());
        }
        Ok(())
    }

    /// Close the launch cycle: revert the doorstop patch and resolve the
    /// cycle's backup set, exactly once, before the controller can idle.
    fn finish_launch_cycle(&mut self) {
        if self.config.distribution_variant.needs_launch_patch() {
            match patcher::revert_launch_patch(&self.config.installation_path) {
                Ok(outcome) => tracing::info!("launch patch reverted ({outcome:?})"),
                Err(err) => tracing::error!("failed to revert launch patch: {err}"),
            }
        }
        if let Some(backups) = self.launch_backups.take() {
            // The revert's restore branch already moved the config back;
            // whatever is left in the set is stale and safe to drop.
            if let Err(err) = backups.discard() {
                tracing::error!("failed to resolve launch backups: {err}");
            }
        }
    }

    fn fail(&mut self, message: String) {
        tracing::error!("{message}");
        self.last_error = Some(message);
    }

    #[cfg(test)]
    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

/// The strictly sequential install pipeline. Later steps read files the
/// earlier ones put on disk, so there is no interleaving: core archive,
/// then game-file repair, then plugins, then extra data.
fn run_install(
    transport: &dyn Transport,
    dirs: &DataDirs,
    root: &Path,
    manifest: &PackManifest,
    hash_list: &Option<Vec<FileHashEntry>>,
    tx: &Sender<Event>,
) -> Result<(), LauncherError> {
    let installer = PackInstaller::new(transport, &dirs.cache_dir);
    let mut progress = |ratio: f32| {
        let _ = tx.send(Event::Progress(ratio));
    };

    installer.install_archive(
        "BepInEx.zip",
        &dirs.pack_dir,
        &manifest.package.bepin_core,
        &mut progress,
    )?;

    match hash_list {
        Some(list) => {
            installer.repair_game_files(root, &dirs.pack_dir, list, &mut progress)?;
        }
        None => {
            installer.install_archive(
                "BepInEx.zip",
                root,
                &manifest.package.bepin_core,
                &mut progress,
            )?;
        }
    }

    installer.install_plugins(&root.join(game::PLUGIN_DIR_RELATIVE), &manifest.plugins)?;

    installer.install_archive(
        "ExtraData.zip",
        root,
        &manifest.package.extra_data,
        &mut progress,
    )?;

    Ok(())
}
