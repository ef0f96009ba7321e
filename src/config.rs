//! Server configuration. Loading is a thin TOML/serde layer; the fields
//! themselves are exactly the ones the session core consumes.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("jail path must be absolute")]
    JailNotAbsolute,
}

/// Required username; an empty string means any username is accepted.
fn default_login() -> String {
    String::new()
}

/// Adaptive salted hash of the required password; empty means no
/// password is required.
fn default_password_hash() -> String {
    String::new()
}

fn default_addr() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_login")]
    pub login: String,
    #[serde(default = "default_password_hash")]
    pub password_hash: String,
    #[serde(default = "default_addr")]
    pub addr: String,
    pub port_plain: u16,
    pub port_tls: u16,
    pub jail: PathBuf,
    /// PEM certificate chain for `port_tls` and `AUTH TLS`. Required if
    /// either is to be reachable.
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login: default_login(),
            password_hash: default_password_hash(),
            addr: default_addr(),
            port_plain: 2121,
            port_tls: 0,
            jail: PathBuf::from("/"),
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.jail.is_absolute() {
            return Err(ConfigError::JailNotAbsolute);
        }
        Ok(())
    }

    /// Returns true if users may connect using any username.
    pub fn allow_any_user(&self) -> bool {
        self.login.is_empty()
    }

    /// Returns true if a password is required for authentication.
    pub fn password_required(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_relative_jail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "jail = \"relative/dir\"\nport_plain = 2121\nport_tls = 0").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::JailNotAbsolute));
    }

    #[test]
    fn loads_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "jail = \"/srv/ftp\"\nport_plain = 2121\nport_tls = 0").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.jail, PathBuf::from("/srv/ftp"));
        assert!(config.allow_any_user());
        assert!(!config.password_required());
    }
}
