//! Runtime configuration
//!
//! Settings are layered: built-in defaults, then the optional JSON config file,
//! then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::constants::{defaults, paths};

/// Effective settings for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rpc_path: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Seconds between progress refreshes
    pub interval: u64,
    /// Desktop entry id of the launcher icon, e.g. `transmission-gtk.desktop`
    pub launcher: String,
    /// Expose the turtle-mode quicklist item
    pub turtle: bool,
    pub connect_timeout: u64,
    /// Command used to start the daemon, empty when the daemon is managed elsewhere
    pub spawn: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: defaults::RPC_HOST.to_string(),
            port: defaults::RPC_PORT,
            rpc_path: defaults::RPC_PATH.to_string(),
            user: None,
            password: None,
            interval: defaults::UPDATE_INTERVAL_SECS,
            launcher: defaults::LAUNCHER_ENTRY.to_string(),
            turtle: false,
            connect_timeout: defaults::CONNECT_TIMEOUT_SECS,
            spawn: Vec::new(),
        }
    }
}

/// Values given on the command line; `None` leaves the file/default value alone
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub rpc_path: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub interval: Option<u64>,
    pub launcher: Option<String>,
    pub turtle: bool,
    pub connect_timeout: Option<u64>,
    pub spawn: Vec<String>,
}

impl Config {
    /// `$XDG_CONFIG_HOME/transmission-launcher/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::CONFIG_DIR).join(paths::CONFIG_FILE))
    }

    /// Load the config file at `path`, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(rpc_path) = overrides.rpc_path {
            self.rpc_path = rpc_path;
        }
        if overrides.user.is_some() {
            self.user = overrides.user;
        }
        if overrides.password.is_some() {
            self.password = overrides.password;
        }
        if let Some(interval) = overrides.interval {
            self.interval = interval;
        }
        if let Some(launcher) = overrides.launcher {
            self.launcher = launcher;
        }
        // A flag can only switch the quicklist on; the file may already have it enabled
        self.turtle |= overrides.turtle;
        if let Some(timeout) = overrides.connect_timeout {
            self.connect_timeout = timeout;
        }
        if !overrides.spawn.is_empty() {
            self.spawn = overrides.spawn;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("RPC host must not be empty");
        }
        if self.interval == 0 {
            bail!("Update interval must be at least 1 second");
        }
        if self.launcher.trim().is_empty() {
            bail!("Launcher entry id must not be empty");
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> String {
        let path = if self.rpc_path.starts_with('/') {
            self.rpc_path.clone()
        } else {
            format!("/{}", self.rpc_path)
        };
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_transmission() {
        let config = Config::default();
        assert_eq!(config.rpc_url(), "http://localhost:9091/transmission/rpc");
        assert_eq!(config.update_interval(), Duration::from_secs(20));
        assert_eq!(config.launcher, "transmission-gtk.desktop");
        assert!(!config.turtle);
        assert!(config.spawn.is_empty());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "host": "nas.local", "turtle": true, "user": "me" }}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.host, "nas.local");
        assert_eq!(config.user.as_deref(), Some("me"));
        assert!(config.turtle);
        assert_eq!(config.port, 9091);
        assert_eq!(config.interval, 20);
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{err}").contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let mut config = Config {
            host: "nas.local".to_string(),
            turtle: true,
            spawn: vec!["transmission-daemon".to_string()],
            ..Config::default()
        };

        config.apply(Overrides {
            port: Some(9092),
            interval: Some(5),
            ..Overrides::default()
        });

        assert_eq!(config.host, "nas.local");
        assert_eq!(config.port, 9092);
        assert_eq!(config.interval, 5);
        // Unset flags must not disable or clear file values
        assert!(config.turtle);
        assert_eq!(config.spawn, vec!["transmission-daemon".to_string()]);
    }

    #[test]
    fn test_rpc_url_adds_leading_slash() {
        let config = Config {
            rpc_path: "rpc".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.rpc_url(), "http://localhost:8080/rpc");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_interval = Config {
            interval: 0,
            ..Config::default()
        };
        assert!(zero_interval.validate().is_err());

        let empty_launcher = Config {
            launcher: "  ".to_string(),
            ..Config::default()
        };
        assert!(empty_launcher.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }
}
