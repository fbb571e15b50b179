//! Optional TOML configuration
//!
//! Looked up as `mosys_config.toml` next to the executable, then in the
//! working directory. Every field is optional, a missing file means defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::chromium_ec::{EcDriverType, LpcEcConfig, LpcProtocol};
use crate::lock::{DEFAULT_LOCK_PATH, DEFAULT_LOCK_TIMEOUT_MS};
use crate::portio::file::default_ranges;
use crate::portio::{PortIoBackend, PortRange};

pub const CONFIG_FILE: &str = "mosys_config.toml";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub ec: EcConfig,
    #[serde(default)]
    pub superio: SuperIoConfig,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    pub backend: Option<PortIoBackend>,
    pub ranges: Option<Vec<PortRange>>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EcConfig {
    pub driver: Option<EcDriverType>,
    pub protocol: Option<LpcProtocol>,
    pub timeout_us: Option<u64>,
    pub poll_interval_us: Option<u64>,
    pub lock_path: Option<PathBuf>,
    pub lock_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SuperIoConfig {
    /// Probed after the well-known ports of each chip family
    #[serde(default)]
    pub extra_ports: Vec<u16>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn from_toml(toml_str: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn io_backend(&self) -> PortIoBackend {
        self.io.backend.unwrap_or_default()
    }

    pub fn io_ranges(&self) -> Vec<PortRange> {
        self.io.ranges.clone().unwrap_or_else(default_ranges)
    }

    pub fn ec_driver(&self) -> EcDriverType {
        self.ec.driver.unwrap_or_default()
    }

    /// Transport settings with defaults filled in
    pub fn lpc_ec(&self) -> LpcEcConfig {
        let defaults = LpcEcConfig::default();
        LpcEcConfig {
            protocol: self.ec.protocol.unwrap_or(defaults.protocol),
            timeout_us: self.ec.timeout_us.unwrap_or(defaults.timeout_us),
            poll_interval_us: self
                .ec
                .poll_interval_us
                .unwrap_or(defaults.poll_interval_us),
            lock_path: Some(
                self.ec
                    .lock_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_PATH)),
            ),
            lock_timeout_ms: self.ec.lock_timeout_ms.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}

/// Candidate locations of the config file, in lookup order
fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![];
    if let Ok(mut path) = std::env::current_exe() {
        path.pop();
        path.push(CONFIG_FILE);
        candidates.push(path);
    }
    candidates.push(PathBuf::from(CONFIG_FILE));
    candidates
}

/// Load the config from `path`, or from the default locations
///
/// An explicitly given file must exist, a missing default file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match config_candidates().into_iter().find(|p| p.exists()) {
            Some(path) => path,
            None => {
                debug!("No {} found, using defaults", CONFIG_FILE);
                return Ok(Config::default());
            }
        },
    };

    debug!("Reading config from {}", path.display());
    let toml_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = Config::from_toml(&toml_str, &path)?;
    trace!("{:?}", config);
    Ok(config)
}
