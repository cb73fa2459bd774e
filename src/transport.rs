use crate::error::LauncherError;
use std::{
    fs::File,
    io,
    path::Path,
    time::Duration,
};

const USER_AGENT: &str = "Latchkey";

/// Injected HTTP capability. Production uses [`HttpTransport`]; tests swap
/// in a fake so installs run without a network.
pub trait Transport: Send + Sync {
    fn fetch_text(&self, url: &str) -> Result<String, LauncherError>;
    fn download(&self, url: &str, dest: &Path) -> Result<(), LauncherError>;
}

pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(60))
            .timeout_write(Duration::from_secs(60))
            .build();
        Self { agent }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}


impl Transport for HttpTransport {
    fn fetch_text(&self, url: &str) -> Result<String, LauncherError> {
        let response = self
            .agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|err| LauncherError::Transport(err.to_string()))?;
        response
            .into_string()
            .map_err(|err| LauncherError::Transport(err.to_string()))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), LauncherError> {
        let response = self
            .agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|err| LauncherError::Transport(err.to_string()))?;
        let mut reader = response.into_reader();
        let mut file = File::create(dest)
            .map_err(|err| LauncherError::Transport(format!("create {:?}: {err}", dest)))?;
        io::copy(&mut reader, &mut file)
            .map_err(|err| LauncherError::Transport(format!("write {:?}: {err}", dest)))?;
        Ok(())
    }
}
