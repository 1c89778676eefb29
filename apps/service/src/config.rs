use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{Target, TargetRegistry};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to write config {}: {source}", .path.display())]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("No config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default = "TargetRegistry::default_targets")]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Seconds between the start of two rounds
    pub interval_secs: u64,
    /// Upper bound for a single probe
    pub timeout_secs: u64,
    /// How long `ping` waits for its echo reply
    pub ping_wait_secs: u64,
    pub mode: ProbeMode,
}

/// Whether probes hit the network or are simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    #[default]
    Live,
    Mock,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMode::Live => write!(f, "live"),
            ProbeMode::Mock => write!(f, "mock"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "cloud_pulse.db".into(), pool_size: 8 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { interval_secs: 10, timeout_secs: 5, ping_wait_secs: 2, mode: ProbeMode::Live }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            probe: ProbeConfig::default(),
            targets: TargetRegistry::default_targets(),
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

/// Get default config path ($XDG_CONFIG_HOME/pulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("pulse/config.toml"))
}

impl fmt::Display for Config {
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
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Pool Size", &self.database.pool_size)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Mode", &self.probe.mode)?;
        write_1(f, "Interval (s)", &self.probe.interval_secs)?;
        write_1(f, "Timeout (s)", &self.probe.timeout_secs)?;
        write_1(f, "Ping Wait (s)", &self.probe.ping_wait_secs)?;
        write_title_1(f, "Targets")?;
        for target in &self.targets {
            write_1(f, &target.name, &target.method)?;
            write_2(f, "Location", &target.location.display())?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pulse/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            config
        };

        config.validate()?;
        Ok(config)
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

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.interval_secs == 0 {
            return Err(ConfigError::Invalid("probe.interval_secs must be at least 1".into()));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::Invalid("probe.timeout_secs must be at least 1".into()));
        }
        if self.probe.ping_wait_secs == 0 {
            return Err(ConfigError::Invalid("probe.ping_wait_secs must be at least 1".into()));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid("database.pool_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProbeMethod;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.probe.interval_secs, 10);
        assert_eq!(config.probe.timeout_secs, 5);
        assert_eq!(config.probe.ping_wait_secs, 2);
        assert_eq!(config.probe.mode, ProbeMode::Live);
        assert_eq!(config.targets.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/pulse");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(dir.path().join("nested/pulse.toml").exists());

        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded.targets, config.targets);
        assert_eq!(reloaded.database.path, config.database.path);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[probe]
mode = "mock"

[[targets]]
name = "A"
url = "http://ok.test"

[targets.location]
city = "Berlin"
country = "Germany"
lat = 52.52
lon = 13.40
"#,
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.probe.mode, ProbeMode::Mock);
        assert_eq!(config.probe.interval_secs, 10);
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].method, ProbeMethod::Http { url: "http://ok.test".into() });
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.probe.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.database.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_lists_targets() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("GitHub (US-West)"));
        assert!(rendered.contains("Sydney, Australia"));
    }
}
