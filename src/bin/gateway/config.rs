//! Configuration resolution for the binary

use std::path::{Path, PathBuf};

use drone_gateway::config::{ConfigError, GatewayConfig};

const DEFAULT_CONFIG_FILE: &str = "gateway.toml";

/// Where the configuration came from
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => write!(f, "defaults"),
        }
    }
}

/// Load configuration
///
/// Priority:
/// 1. `--config` path
/// 2. GATEWAY_CONFIG environment variable
/// 3. ./gateway.toml
/// 4. Default configuration
///
/// Environment overrides apply in every case. A file that was named or
/// found but cannot be loaded is an error rather than a silent fallback.
pub fn load_config(cli_path: Option<&Path>) -> Result<(GatewayConfig, ConfigSource), ConfigError> {
    let named = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("GATEWAY_CONFIG").map(PathBuf::from));

    let path = match named {
        Some(path) => Some(path),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            local.exists().then_some(local)
        },
    };

    match path {
        Some(path) => {
            let config = GatewayConfig::from_file_with_env(&path)?;
            Ok((config, ConfigSource::File(path)))
        },
        None => Ok((GatewayConfig::from_env(), ConfigSource::Defaults)),
    }
}
