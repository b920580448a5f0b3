#[macro_use]
extern crate tracing;
pub mod definition;
pub mod domain_xml;
pub mod error;
pub mod lifecycle;
pub mod mac;
pub mod parsers;
pub mod session;
pub mod structs;
pub mod transfer;
pub mod transport;
mod xml_consts;

pub use error::{Result, VirshError};
pub use session::Session;

use config::{Config, ConfigError};
use lazy_static::lazy_static;
use std::sync::RwLock;

pub const ENV_PREFIX: &str = "VIRSH_REMOTE";

/// Reads `cfg_file` (if present) overlaid with `VIRSH_REMOTE_*` variables.
pub fn load_settings(cfg_file: &str) -> std::result::Result<Config, ConfigError> {
    Config::builder()
        .add_source(config::File::with_name(cfg_file).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Config> = RwLock::new({
        let cfg_file = match std::env::var("CONFIG_FILE_PATH") {
            Ok(s) => s,
            Err(_e) => "./config.toml".to_string(),
        };
        match load_settings(&cfg_file) {
            Ok(s) => s,
            Err(e) => {
                panic!("{}", e);
            }
        }
    });
}
