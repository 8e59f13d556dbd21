//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_shell_path")]
    pub shell_path: PathBuf,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_shell_path() -> PathBuf {
    PathBuf::from("/bin/sh")
}

fn default_max_suggestions() -> usize {
    webterm_core::complete::MAX_SUGGESTIONS
}

fn default_read_buffer_size() -> usize {
    webterm_core::DEFAULT_READ_BUF_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            shell_path: default_shell_path(),
            max_suggestions: default_max_suggestions(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.shell_path, PathBuf::from("/bin/sh"));
        assert_eq!(config.max_suggestions, 50);
        assert_eq!(config.read_buffer_size, 8192);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let config: Config = toml::from_str("port = 9999\nread_buffer_size = 4096\n").unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.read_buffer_size, 4096);
    }
}
