use std::net::SocketAddr;
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
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub gateway: Gateway,
    pub dispatch: Dispatch,
    pub auth: Auth,
    pub storage: Storage,
    pub status: Status,
    /// Targets inserted into the store at startup when missing
    pub targets: Vec<SeedTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Gateway {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Dispatch {
    pub interval_seconds: u64,
    pub task_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Auth {
    /// How far a registration timestamp may drift from hub time
    pub max_clock_skew_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Libsql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub backend: StorageBackend,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTarget {
    pub url: String,
    #[serde(default = "default_owner")]
    pub owner: String,
}

fn default_owner() -> String {
    "config".to_string()
}

impl Default for Gateway {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: guardian_proto::DEFAULT_HUB_PORT }
    }
}

impl Default for Dispatch {
    fn default() -> Self {
        Self { interval_seconds: 10, task_ttl_seconds: 30, sweep_interval_seconds: 5 }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self { max_clock_skew_seconds: 60 }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self { backend: StorageBackend::Libsql, path: "guardian.db".into() }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self { enabled: true, bind: "0.0.0.0".into(), port: 8080 }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Libsql => write!(f, "libsql"),
        }
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

/// Get default config path ($XDG_CONFIG_HOME/guardian/hub.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("guardian/hub.toml"))
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

impl fmt::Display for HubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Hub Configuration:")?;
        write_title_1(f, "Gateway")?;
        write_1(f, "Bind Address", &self.gateway.bind)?;
        write_1(f, "Port", &self.gateway.port)?;
        write_title_1(f, "Dispatch")?;
        write_1(f, "Interval (s)", &self.dispatch.interval_seconds)?;
        write_1(f, "Task TTL (s)", &self.dispatch.task_ttl_seconds)?;
        write_1(f, "Sweep Interval (s)", &self.dispatch.sweep_interval_seconds)?;
        write_title_1(f, "Auth")?;
        write_1(f, "Max Clock Skew (s)", &self.auth.max_clock_skew_seconds)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Backend", &self.storage.backend)?;
        write_1(f, "Path", &self.storage.path)?;
        write_title_1(f, "Status Server")?;
        write_1(f, "Enabled", &self.status.enabled)?;
        write_1(f, "Bind Address", &self.status.bind)?;
        write_1(f, "Port", &self.status.port)?;
        write_title_1(f, "Seed Targets")?;
        for target in &self.targets {
            write_1(f, &target.owner, &target.url)?;
        }

        Ok(())
    }
}

impl HubConfig {
    /// Generate HubConfig structure from file
    ///
    /// Creates a default config in ~/.config/guardian/hub.toml
    ///  or the specified path, with a .toml extension, if one does not exist
    ///
    /// ```rust,no_run
    /// let cfg = guardian_hub::config::HubConfig::from_config(None::<&std::path::Path>).unwrap();
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
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
        env_override("GUARDIAN_BIND", &mut self.gateway.bind)?;
        env_override("GUARDIAN_PORT", &mut self.gateway.port)?;
        env_override("GUARDIAN_DISPATCH_INTERVAL", &mut self.dispatch.interval_seconds)?;
        env_override("GUARDIAN_TASK_TTL", &mut self.dispatch.task_ttl_seconds)?;
        env_override("GUARDIAN_STORAGE_PATH", &mut self.storage.path)?;
        env_override("GUARDIAN_STATUS_PORT", &mut self.status.port)?;
        Ok(())
    }

    pub fn gateway_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.gateway.bind, self.gateway.port)
    }

    pub fn status_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.status.bind, self.status.port)
    }
}

impl Dispatch {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_seconds.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Auth {
    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_seconds)
    }
}

fn socket_addr(bind: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let raw = format!("{bind}:{port}");
    raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.gateway.port, 5050);
        assert_eq!(config.dispatch.interval(), Duration::from_secs(10));
        assert_eq!(config.dispatch.task_ttl(), Duration::from_secs(30));
        assert_eq!(config.auth.max_clock_skew(), Duration::from_secs(60));
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("hub");

        let config = HubConfig::from_config(Some(&path)).unwrap();
        assert_eq!(config.gateway.port, 5050);
        assert!(dir.path().join("nested").join("hub.toml").exists());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(
            &path,
            r#"
[dispatch]
interval_seconds = 3

[storage]
backend = "memory"

[[targets]]
url = "https://example.com"
"#,
        )
        .unwrap();

        let config = HubConfig::from_config(Some(&path)).unwrap();
        assert_eq!(config.dispatch.interval_seconds, 3);
        assert_eq!(config.dispatch.task_ttl_seconds, 30);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.targets[0].owner, "config");
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "gateway = 5").unwrap();

        assert!(matches!(HubConfig::from_config(Some(&path)), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_addresses() {
        let config = HubConfig::default();
        assert_eq!(config.gateway_addr().unwrap().port(), 5050);

        let mut bad = HubConfig::default();
        bad.gateway.bind = "not an ip".into();
        assert!(bad.gateway_addr().is_err());
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = HubConfig::default().to_string();
        assert!(rendered.contains("Gateway"));
        assert!(rendered.contains("Task TTL (s): 30"));
    }
}
