// src/config.rs

//! Resolver configuration
//!
//! Loaded from TOML. Every key is optional:
//!
//! ```toml
//! max_attempts = 10
//! anchor_package = "python"
//! conflict_explosion_threshold = 10
//! channel_priority = "strict"
//! strategy = "highest"
//! package_format = "prefer-conda"
//! solve_timeout_secs = 300
//! ```

use crate::error::{Error, Result};
use crate::index::PackageFormat;
use crate::resolver::{ChannelPriority, SolveStrategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name under the user config directory
pub const CONFIG_FILE: &str = "envsolve/resolver.toml";

/// Default cap on bounded solver attempts
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Default number of new conflicts in one round that counts as an explosion
pub const DEFAULT_EXPLOSION_THRESHOLD: usize = 10;

/// Tunables for the resolution loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Cap on bounded attempts; the actual count is also limited by the
    /// number of installed packages
    pub max_attempts: usize,
    /// Runtime package whose version change forces rebuilds
    pub anchor_package: String,
    pub conflict_explosion_threshold: usize,
    pub channel_priority: ChannelPriority,
    pub strategy: SolveStrategy,
    pub package_format: PackageFormat,
    /// Wall clock limit for a single solver call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solve_timeout_secs: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            anchor_package: "python".to_string(),
            conflict_explosion_threshold: DEFAULT_EXPLOSION_THRESHOLD,
            channel_priority: ChannelPriority::default(),
            strategy: SolveStrategy::default(),
            package_format: PackageFormat::default(),
            solve_timeout_secs: None,
        }
    }
}

impl ResolverConfig {
    /// Parse a config from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ResolverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, else the user config file if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.conflict_explosion_threshold == 0 {
            return Err(Error::ConfigError(
                "conflict_explosion_threshold must be at least 1".to_string(),
            ));
        }
        if self.anchor_package.trim().is_empty() {
            return Err(Error::ConfigError(
                "anchor_package must not be empty".to_string(),
            ));
        }
        if self.solve_timeout_secs == Some(0) {
            return Err(Error::ConfigError(
                "solve_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn solve_timeout(&self) -> Option<Duration> {
        self.solve_timeout_secs.map(Duration::from_secs)
    }

    /// Serialize the config to TOML
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// `<config dir>/envsolve/resolver.toml`, when a config dir exists
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_is_default() {
        let config = ResolverConfig::from_toml("").unwrap();
        assert_eq!(config, ResolverConfig::default());
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.anchor_package, "python");
        assert_eq!(config.solve_timeout(), None);
    }

    #[test]
    fn test_parse_config_string() {
        let toml = r#"
max_attempts = 3
anchor_package = "ruby"
channel_priority = "disabled"
strategy = "lowest-direct"
package_format = "only-tar-bz2"
solve_timeout_secs = 30
"#;
        let config = ResolverConfig::from_toml(toml).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.anchor_package, "ruby");
        assert_eq!(config.channel_priority, ChannelPriority::Disabled);
        assert_eq!(config.strategy, SolveStrategy::LowestDirect);
        assert_eq!(config.package_format, PackageFormat::OnlyTarBz2);
        assert_eq!(config.solve_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.conflict_explosion_threshold, 10);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(ResolverConfig::from_toml("max_attempts = 0").is_err());
        assert!(ResolverConfig::from_toml("anchor_package = \"\"").is_err());
        assert!(ResolverConfig::from_toml("strategy = \"random\"").is_err());
        assert!(ResolverConfig::from_toml("unknown_key = 1").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "conflict_explosion_threshold = 4").unwrap();
        let config = ResolverConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.conflict_explosion_threshold, 4);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ResolverConfig {
            solve_timeout_secs: Some(60),
            ..ResolverConfig::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(ResolverConfig::from_toml(&text).unwrap(), config);
    }
}
