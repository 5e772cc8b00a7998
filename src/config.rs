//! Application configuration loading.
//!
//! A single optional `strata.toml` carries the logging section. CI rule
//! thresholds live in their own YAML file (see [`crate::ci::CiConfig`]).

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "strata.toml";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the given file, or from `strata.toml` in
    /// the working directory when none is given. A missing default file
    /// yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
        match path {
            Some(explicit) => Self::load_from_file(explicit),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load_from_file(default)
                } else {
                    Ok(AppConfig::default())
                }
            }
        }
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<AppConfig, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[logging]\nlevel = \"debug\"\noutput = \"stderr\"\n"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.output, "stderr");
        // unset fields fall back to defaults
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/strata.toml"))).is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[logging\nlevel = ").unwrap();
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigError::ParseToml { .. })
        ));
    }
}
