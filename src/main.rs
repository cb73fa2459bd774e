mod backup;
mod config;
mod controller;
mod error;
mod game;
mod hashing;
mod installer;
mod manifest;
mod patcher;
mod platform;
mod supervisor;
mod transport;

use anyhow::{bail, Result};
use config::{DataDirs, LauncherConfig};
use controller::{Controller, State};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

enum Command {
    Status,
    Install,
    Launch,
    Refresh,
    Uninstall,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut command = Command::Status;
    let mut path_override: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "status" => command = Command::Status,
            "install" => command = Command::Install,
            "launch" => command = Command::Launch,
            "refresh" => command = Command::Refresh,
            "uninstall" => command = Command::Uninstall,
            "--path" | "-p" => {
                if let Some(path) = args.next() {
                    path_override = Some(PathBuf::from(path));
                } else {
                    eprintln!("--path requires a directory");
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("unknown argument: {other}");
                print_help();
                return Ok(());
            }
        }
    }

    let mut config = LauncherConfig::load_or_create()?;
    if let Some(path) = path_override {
        if !game::verify_install_dir(&path) {
            bail!("{:?} does not contain {}", path, game::GAME_EXE);
        }
        config.installation_path = path;
    }

    if let Command::Uninstall = command {
        return uninstall(config);
    }

    let dirs = DataDirs::resolve()?;
    let transport = Arc::new(transport::HttpTransport::new());
    let mut controller = Controller::new(transport, config, dirs);
    controller.startup()?;

    match command {
        Command::Status | Command::Refresh => print_status(&controller),
        Command::Install => match controller.state() {
            State::Install | State::Update => {
                controller.activate();
                controller.run_until_idle()?;
                print_status(&controller);
            }
            State::Launch => println!("pack is already up to date"),
            _ => print_status(&controller),
        },
        Command::Launch => match controller.state() {
            State::Launch => {
                controller.activate();
                // Blocks through Running until the game exits and the
                // launch patch has been reverted.
                controller.run_until_idle()?;
                print_status(&controller);
            }
            State::Install | State::Update => {
                println!("pack is not installed or out of date; run `latchkey install` first");
            }
            _ => print_status(&controller),
        },
        Command::Uninstall => unreachable!(),
    }

    controller.shutdown()
}

fn uninstall(config: LauncherConfig) -> Result<()> {
    if !game::verify_install_dir(&config.installation_path) {
        bail!("no known {} installation; pass --path", game::GAME_NAME);
    }
    supervisor::kill_running();
    let outcome = patcher::uninstall(&config.installation_path)?;
    println!("uninstalled ({outcome:?})");
    config.save()
}

fn print_status(controller: &Controller) {
    println!("game:    {:?}", controller.config.installation_path);
    println!(
        "channel: {}",
        controller.config.distribution_variant.label()
    );
    println!("state:   {}", controller.state().label());
    if let Some(error) = controller.last_error() {
        println!("error:   {error}");
    }
    if controller.state() == State::Refresh {
        println!(
            "{} could not be found; start the game once or pass --path",
            game::GAME_NAME
        );
    }
}

fn print_help() {
    println!("latchkey - installer and launcher for the mod pack");
    println!("  status            Show the detected installation and pack state (default)");
    println!("  install           Install or update the pack");
    println!("  launch            Patch, launch the game, and revert on exit");
    println!("  refresh           Re-run installation discovery");
    println!("  uninstall         Remove the pack or restore backed-up plugins");
    println!("  --path <dir>      Use <dir> as the game installation");
}
