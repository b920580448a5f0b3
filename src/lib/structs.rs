use config::{Config, ConfigError};
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_USERNAME: &str = "root";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Connection settings for the hypervisor host, read from the config file
/// and `VIRSH_REMOTE_*` environment variables.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HostSettings {
    pub host: String,
    pub port: u16,
    pub remote_base_path: String,
    pub username: String,
    pub password: String,
    pub log_level: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings {
            host: "".to_string(),
            port: DEFAULT_PORT,
            remote_base_path: "".to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: "".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl HostSettings {
    pub fn from_config(cfg: &Config) -> Result<HostSettings, ConfigError> {
        cfg.clone().try_deserialize()
    }
}
