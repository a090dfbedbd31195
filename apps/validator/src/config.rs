use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to write config file {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub hub: Hub,
    pub identity: Identity,
    pub checks: Checks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hub {
    pub url: String,
    pub reconnect_delay_seconds: u64,
    /// How long to wait for `registered` before giving up on a connection
    pub registration_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    /// Secret key file; defaults to `validator.key` beside the config file
    pub keypair_path: Option<path::PathBuf>,
    pub location: String,
    /// Advertised address; the hub records the socket address regardless
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Checks {
    pub timeout_seconds: u64,
    pub degraded_threshold_ms: u64,
    pub allow_private_targets: bool,
}

impl Default for Hub {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{}", guardian_proto::DEFAULT_HUB_PORT),
            reconnect_delay_seconds: 5,
            registration_timeout_seconds: 15,
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self { keypair_path: None, location: "unknown".into(), ip: None }
    }
}

impl Default for Checks {
    fn default() -> Self {
        Self { timeout_seconds: 10, degraded_threshold_ms: 1000, allow_private_targets: false }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

fn config_dir() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("guardian"))
}

fn env_override<T: std::str::FromStr>(
    name: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Ok(raw) = env::var(name) {
        *target = raw.parse().map_err(|_| ConfigError::InvalidEnv { name, value: raw })?;
    }
    Ok(())
}

impl fmt::Display for ValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_1 = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            writeln!(f, "    {}: {}", label, value)
        };

        writeln!(f, "Current Validator Configuration:")?;
        writeln!(f, "  Hub")?;
        write_1(f, "URL", &self.hub.url)?;
        write_1(f, "Reconnect Delay (s)", &self.hub.reconnect_delay_seconds)?;
        write_1(f, "Registration Timeout (s)", &self.hub.registration_timeout_seconds)?;
        writeln!(f, "  Identity")?;
        match &self.identity.keypair_path {
            Some(path) => write_1(f, "Keypair", &path.display())?,
            None => write_1(f, "Keypair", &"<config dir>/validator.key")?,
        }
        write_1(f, "Location", &self.identity.location)?;
        write_1(f, "IP", &self.identity.ip.as_deref().unwrap_or("<peer address>"))?;
        writeln!(f, "  Checks")?;
        write_1(f, "Timeout (s)", &self.checks.timeout_seconds)?;
        write_1(f, "Degraded Threshold (ms)", &self.checks.degraded_threshold_ms)?;
        write_1(f, "Allow Private Targets", &self.checks.allow_private_targets)?;

        Ok(())
    }
}

/// A loaded config together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ValidatorConfig,
    pub path: path::PathBuf,
}

impl ValidatorConfig {
    /// Load from `optional_path` or `~/.config/guardian/validator.toml`,
    /// writing the defaults there first if the file does not exist.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<LoadedConfig, ConfigError> {
        let config_path = match optional_path {
            Some(path) => normalize_toml_path(path.as_ref()),
            None => config_dir()?.join("validator.toml"),
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        Ok(LoadedConfig { config, path: config_path })
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply `GUARDIAN_*` environment overrides on top of the file values
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        env_override("GUARDIAN_HUB_URL", &mut self.hub.url)?;
        env_override("GUARDIAN_LOCATION", &mut self.identity.location)?;

        if let Ok(path) = env::var("GUARDIAN_KEYPAIR_PATH") {
            self.identity.keypair_path = Some(path.into());
        }
        if let Ok(ip) = env::var("GUARDIAN_IP") {
            self.identity.ip = Some(ip);
        }
        Ok(())
    }

    /// Keypair location, resolved against the config file's directory
    pub fn keypair_path(&self, config_path: &path::Path) -> path::PathBuf {
        let base = config_path.parent().unwrap_or_else(|| path::Path::new("."));
        match &self.identity.keypair_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base.join(path),
            None => base.join("validator.key"),
        }
    }
}

impl Hub {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds.max(1))
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_seconds.max(1))
    }
}

impl Checks {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}
