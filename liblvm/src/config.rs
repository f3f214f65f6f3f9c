// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the directory that holds `lvm.conf`
pub const SYSTEM_DIR_ENV: &str = "LVM_SYSTEM_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("invalid config {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// How the library handle is initialized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LvmConfig {
    /// Directory holding `lvm.conf`; the library default when unset
    pub system_dir: Option<PathBuf>,
    /// `lvm.conf` fragments applied with `config_override`, in order
    pub overrides: Vec<String>,
    /// Rescan devices right after initialization
    pub scan_on_open: bool,
}

impl LvmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an environment-like lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let system_dir = lookup(SYSTEM_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            system_dir,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        let config = Self::parse(&raw).map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::debug!(?path, "Loaded LVM config");
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(raw).map_err(|error| error.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(index) = self.overrides.iter().position(|o| o.trim().is_empty()) {
            return Err(format!("overrides[{index}] must not be empty"));
        }
        if let Some(dir) = &self.system_dir {
            if dir.as_os_str().is_empty() {
                return Err("system_dir must not be empty".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = LvmConfig::parse(
            r#"
system_dir = "/etc/lvm-test"
overrides = ['devices { filter = [ "a|loop|", "r|.*|" ] }']
scan_on_open = true
"#,
        )
        .unwrap();

        assert_eq!(config.system_dir, Some(PathBuf::from("/etc/lvm-test")));
        assert_eq!(config.overrides.len(), 1);
        assert!(config.scan_on_open);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config = LvmConfig::parse("").unwrap();
        assert_eq!(config, LvmConfig::default());
    }

    #[test]
    fn rejects_blank_override() {
        let err = LvmConfig::parse("overrides = ['global { }', '  ']").unwrap_err();
        assert!(err.contains("overrides[1]"));
    }

    #[test]
    fn rejects_unparsable_toml() {
        assert!(LvmConfig::parse("scan_on_open = 'yes'").is_err());
    }

    #[test]
    fn lookup_reads_system_dir() {
        let config = LvmConfig::from_lookup(|key| {
            (key == SYSTEM_DIR_ENV).then(|| "/run/lvm-conf".to_string())
        });
        assert_eq!(config.system_dir, Some(PathBuf::from("/run/lvm-conf")));

        let config = LvmConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(config.system_dir, None);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = LvmConfig::load(Path::new("/nonexistent/liblvm.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
