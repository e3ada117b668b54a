use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

use crate::{
    error::{SimError, SimResult},
    util::{get_port, get_server, get_timeout, server_address},
};

/// Simulator configuration as written in the configuration file
///
/// Settings the recorder needs (API credentials) may share the file and are ignored.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Monitoring server, as a host name, IP address or URL
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default = "crate::util::get_default_port")]
    pub port: u16,

    /// Host the recording was captured for; names the default recording file
    pub hostname: Option<String>,

    /// Recording to replay (defaults to `<hostname>.yaml`)
    pub recording: Option<PathBuf>,

    /// Seconds between send cycles
    #[serde(default = "default_send_interval")]
    pub send_interval: u64,

    /// Seconds between active-check refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Seconds a single exchange with the server may take
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Fixed starting session, random when absent
    pub session_seed: Option<u64>,
}

fn default_send_interval() -> u64 {
    5
}

fn default_refresh_interval() -> u64 {
    120
}

fn default_timeout() -> u64 {
    10
}

/// Validated settings the engine runs with
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// `host:port` of the active-agent listener
    pub server_address: String,
    pub recording: PathBuf,
    pub send_interval: Duration,
    pub refresh_interval: Duration,
    pub timeout: Duration,
    pub session_seed: Option<u64>,
}

impl ResolvedConfig {
    /// Countdown step applied to every item on each send cycle
    pub fn send_step(&self) -> u64 {
        self.send_interval.as_secs()
    }
}

impl Config {
    /// Apply environment overrides and validate.
    pub fn resolve(self) -> SimResult<ResolvedConfig> {
        let server = get_server()
            .or(self.server)
            .ok_or_else(|| SimError::Configuration("no server configured".to_string()))?;
        if server.trim().is_empty() {
            return Err(SimError::Configuration("server is empty".to_string()));
        }

        let port = get_port().unwrap_or(self.port);
        let timeout = get_timeout().unwrap_or(self.timeout);

        let recording = match (self.recording, self.hostname) {
            (Some(recording), _) => recording,
            (None, Some(hostname)) => PathBuf::from(format!("{hostname}.yaml")),
            (None, None) => {
                return Err(SimError::Configuration(
                    "neither recording nor hostname configured".to_string(),
                ));
            }
        };

        for (name, value) in [
            ("send_interval", self.send_interval),
            ("refresh_interval", self.refresh_interval),
            ("timeout", timeout),
        ] {
            if value == 0 {
                return Err(SimError::Configuration(format!("{name} must be positive")));
            }
        }

        Ok(ResolvedConfig {
            server_address: server_address(&server, port),
            recording,
            send_interval: Duration::from_secs(self.send_interval),
            refresh_interval: Duration::from_secs(self.refresh_interval),
            timeout: Duration::from_secs(timeout),
            session_seed: self.session_seed,
        })
    }
}

pub fn parse_config(text: &str) -> SimResult<Config> {
    serde_json::from_str(text)
        .map_err(|e| SimError::Configuration(format!("invalid configuration file: {e}")))
}

pub fn read_config_file(path: impl AsRef<Path>) -> SimResult<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path).map_err(|e| {
        SimError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}
