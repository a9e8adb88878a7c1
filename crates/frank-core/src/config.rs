//! On-disk configuration (`~/.frank/config.toml`), loaded once at each
//! binary's entry point and threaded down as plain data -- no component
//! reaches back into the filesystem for its own settings mid-run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_parallel() -> usize {
    4
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".frank")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSection {
    #[serde(default = "default_region")]
    pub region: String,
    pub cluster: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub task_execution_role_arn: String,
    pub task_role_arn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSection {
    pub listener_arn: String,
    pub vpc_id: String,
    pub public_hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrumSection {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for ScrumSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredsSection {
    #[serde(default = "default_push_interval_secs")]
    pub push_check_secs: u64,
    #[serde(default = "default_pull_interval_secs")]
    pub pull_check_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub oauth_refresh_check_secs: u64,
}

fn default_push_interval_secs() -> u64 {
    5
}
fn default_pull_interval_secs() -> u64 {
    60
}
fn default_refresh_interval_secs() -> u64 {
    60
}

impl Default for CredsSection {
    fn default() -> Self {
        Self {
            push_check_secs: default_push_interval_secs(),
            pull_check_secs: default_pull_interval_secs(),
            oauth_refresh_check_secs: default_refresh_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self { log_format: default_log_format(), log_filter: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    pub cloud: CloudSection,
    pub routing: RoutingSection,
    #[serde(default)]
    pub scrum: ScrumSection,
    #[serde(default)]
    pub creds: CredsSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl Config {
    /// The default config path: `~/.frank/config.toml`.
    pub fn default_path() -> PathBuf {
        default_state_dir().join("config.toml")
    }

    /// Loads from the default path, returning [`ConfigError::NotFound`] if
    /// it does not exist -- callers decide whether that is fatal.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io(e)
            }
        })?;
        let cfg: Config = toml::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join("profiles.json")
    }

    pub fn routing_state_path(&self) -> PathBuf {
        self.state_dir.join("routing.json")
    }

    pub fn scrum_sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    pub fn creds_state_path(&self) -> PathBuf {
        self.state_dir.join("creds.json")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
