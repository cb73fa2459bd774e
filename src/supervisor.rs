use crate::{error::LauncherError, game, platform::Platform};
use std::{path::Path, process::Command, thread, time::Duration};
use sysinfo::{ProcessRefreshKind, RefreshKind, System};

/// How long an indirect launch waits for the game process to appear before
/// the timeout is treated as completion. 60 polls of 500 ms, about 30 s.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            attempts: 60,
        }
    }
}

/// Terminate any live game process. Called defensively before installs and
/// launches so a running game never holds the files being replaced.
pub fn kill_running() {
    let system =
        System::new_with_specifics(RefreshKind::new().with_processes(ProcessRefreshKind::new()));
    for process in system.processes_by_name(game::PROCESS_NAME) {
        tracing::info!("terminating running {} (pid {})", game::GAME_NAME, process.pid());
        process.kill();
    }
}

/// Start the game for its distribution channel and arrange for `on_exit`
/// to fire exactly once when it is gone.
///
/// Direct channels spawn the executable and wait on the child handle.
/// Store channels fire a protocol URI with no handle back, so the game is
/// found by polling the process table; if it never shows up within the
/// budget, the launch is treated as already over rather than leaving the
/// caller waiting forever.
pub fn launch(
    root: &Path,
    platform: Platform,
    budget: PollBudget,
    on_exit: impl FnOnce() + Send + 'static,
) -> Result<(), LauncherError> {
    match platform {
        Platform::Steam => {
            open_uri(game::STEAM_LAUNCH_URI)?;
            thread::spawn(move || {
                poll_until_gone(budget);
                on_exit();
            });
        }
        Platform::Epic => {
            open_uri(game::EPIC_LAUNCH_URI)?;
            thread::spawn(move || {
                poll_until_gone(budget);
                on_exit();
            });
        }
        Platform::Itch | Platform::Unknown => {
            let exe = root.join(game::GAME_EXE);
            let mut child = Command::new(&exe)
                .current_dir(root)
                .spawn()
                .map_err(|err| LauncherError::ProcessLaunch(format!("{:?}: {err}", exe)))?;
            thread::spawn(move || {
                let _ = child.wait();
                on_exit();
            });
        }
    }
    Ok(())
}

/// Block until a process with the game's name has appeared and exited, or
/// the appearance budget ran out.
fn poll_until_gone(budget: PollBudget) {
    for _ in 0..budget.attempts {
        thread::sleep(budget.interval);
        let system = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        );
        if let Some(process) = system.processes_by_name(game::PROCESS_NAME).next() {
            process.wait();
            return;
        };
    }
    tracing::warn!(
        "{} never appeared within the poll budget, treating as exited",
        game::GAME_NAME
    );
}

fn open_uri(uri: &str) -> Result<(), LauncherError> {
    let result = if cfg!(windows) {
        Command::new("cmd").args(["/C", "start", "", uri]).spawn()
    } else {
        Command::new("xdg-open").arg(uri).spawn()
    };
    result
        .map(|_| ())
        .map_err(|err| LauncherError::ProcessLaunch(format!("open {uri}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn poll_timeout_fires_exit_exactly_once() {
        // No game process exists in the test environment, so a tiny budget
        // exercises the timeout-as-completion branch end to end.
        let budget = PollBudget {
            interval: Duration::from_millis(1),
            attempts: 3,
        };
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let handle = thread::spawn(move || {
            poll_until_gone(budget);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.join().unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = launch(dir.path(), Platform::Itch, PollBudget::default(), || {});
        assert!(matches!(result, Err(LauncherError::ProcessLaunch(_))));
    }
}
