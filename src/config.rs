//! Configuration file handling.
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/depforest/config.toml`
//! - macOS: `~/Library/Application Support/depforest/config.toml`
//! - Windows: `%APPDATA%\depforest\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! archive_depth = 2
//! include = ["**/*"]
//! exclude = ["**/.git/**"]
//! read_timeout_secs = 60
//! process_timeout_secs = 900
//!
//! [maven]
//! run_tool = false
//!
//! [composer]
//! generate_lock = true
//!
//! [ignore]
//! packages = ["@types/*"]
//! ```

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Largest archive extraction depth that is accepted.
pub const MAX_ARCHIVE_DEPTH: u8 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many nested archive levels the archive expander may open.
    ///
    /// Default: 2, valid range 0..=7
    pub archive_depth: u8,

    /// Globs selecting files the scan considers.
    ///
    /// Default: `["**/*"]`
    pub include: Vec<String>,

    /// Globs removed from the scan before any resolver runs.
    pub exclude: Vec<String>,

    /// Whether include/exclude globs match case-sensitively.
    pub case_sensitive: bool,

    /// Bound on waiting for each output line of an external tool.
    ///
    /// Default: 60 seconds
    pub read_timeout_secs: u64,

    /// Bound on the whole external tool process.
    ///
    /// Default: 900 seconds
    pub process_timeout_secs: u64,

    /// Size in bytes of the header and footer windows used for partial hashes.
    pub partial_hash_window: usize,

    /// Threads used for fingerprinting.
    pub fingerprint_workers: usize,

    /// Project roots resolved at the same time.
    pub max_concurrent_roots: usize,

    pub maven: MavenConfig,
    pub npm: EcosystemConfig,
    pub composer: ComposerConfig,
    pub os: EcosystemConfig,

    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Per-ecosystem switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcosystemConfig {
    pub enabled: bool,
    /// Invoke the package manager; when false only files are parsed.
    pub run_tool: bool,
}

impl Default for EcosystemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_tool: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MavenConfig {
    #[serde(flatten)]
    pub ecosystem: EcosystemConfig,
    /// Local repository holding resolved artifacts. Defaults to `~/.m2/repository`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_repository: Option<PathBuf>,
}

impl MavenConfig {
    pub fn repository(&self) -> PathBuf {
        self.local_repository
            .clone()
            .unwrap_or_else(crate::platform::maven_local_repository)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    #[serde(flatten)]
    pub ecosystem: EcosystemConfig,
    /// Run `composer update --no-install` when a project has no
    /// `composer.lock`. This writes the lock file into the scanned tree and
    /// may reach the network, so it is off unless asked for.
    pub generate_lock: bool,
}

impl ComposerConfig {
    /// Whether the lock file may be generated with the tool.
    pub fn may_generate_lock(&self) -> bool {
        self.ecosystem.run_tool && self.generate_lock
    }
}

/// Packages dropped from the merged forest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names or globs (e.g. "lodash", "@types/*").
    pub packages: Vec<String>,
}

impl IgnoreConfig {
    pub fn matcher(&self) -> Result<GlobSet, ConfigError> {
        build_glob_set(&self.packages, true)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_depth: 2,
            include: vec!["**/*".to_string()],
            exclude: vec!["**/.git/**".to_string()],
            case_sensitive: true,
            read_timeout_secs: 60,
            process_timeout_secs: 15 * 60,
            partial_hash_window: 1024,
            fingerprint_workers: 4,
            max_concurrent_roots: 2,
            maven: MavenConfig::default(),
            npm: EcosystemConfig::default(),
            composer: ComposerConfig::default(),
            os: EcosystemConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration, creating the parent directory if needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depforest")
            .join("config.toml")
    }

    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Checks every setting that would make a scan meaningless.
    ///
    /// Nothing is scanned with a config that fails here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archive_depth > MAX_ARCHIVE_DEPTH {
            return Err(ConfigError::InvalidArchiveDepth(self.archive_depth));
        }
        if self.include.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyIncludePatterns);
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "read_timeout_secs",
            });
        }
        if self.process_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "process_timeout_secs",
            });
        }
        if self.partial_hash_window == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        if self.fingerprint_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        self.include_set()?;
        self.exclude_set()?;
        self.ignore.matcher()?;
        Ok(())
    }

    pub fn include_set(&self) -> Result<GlobSet, ConfigError> {
        build_glob_set(&self.include, self.case_sensitive)
    }

    pub fn exclude_set(&self) -> Result<GlobSet, ConfigError> {
        build_glob_set(&self.exclude, self.case_sensitive)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }
}

/// Compiles `patterns` into one matcher. `*` does not cross `/`; `**` does.
pub fn build_glob_set(patterns: &[String], case_sensitive: bool) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.iter().filter(|p| !p.trim().is_empty()) {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .literal_separator(true)
            .build()
            .map_err(|e| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::InvalidGlob {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.archive_depth, 2);
        assert_eq!(config.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.process_timeout(), Duration::from_secs(900));
        assert!(config.npm.run_tool);
        assert!(!config.composer.may_generate_lock());
        assert!(config.ignore.packages.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_archive_depth_out_of_range() {
        let config = Config {
            archive_depth: 8,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidArchiveDepth(8)));

        let config = Config {
            archive_depth: 7,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_include_rejected() {
        let config = Config {
            include: vec![],
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyIncludePatterns));

        let config = Config {
            include: vec!["  ".to_string()],
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyIncludePatterns));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let config = Config {
            exclude: vec!["**/[".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            read_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTimeout {
                field: "read_timeout_secs"
            })
        );
    }

    #[test]
    fn test_case_insensitive_globs() {
        let set = build_glob_set(&["**/POM.xml".to_string()], false).unwrap();
        assert!(set.is_match("/a/b/pom.xml"));
        let set = build_glob_set(&["**/POM.xml".to_string()], true).unwrap();
        assert!(!set.is_match("/a/b/pom.xml"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            archive_depth = 0

            [maven]
            run_tool = false
            local_repository = "/opt/m2"

            [composer]
            generate_lock = true

            [ignore]
            packages = ["@types/*"]
            "#,
        )
        .unwrap();

        assert_eq!(config.archive_depth, 0);
        assert!(!config.maven.ecosystem.run_tool);
        assert!(config.maven.ecosystem.enabled);
        assert_eq!(config.maven.repository(), PathBuf::from("/opt/m2"));
        assert!(config.npm.run_tool);
        assert!(config.composer.ecosystem.run_tool);
        assert!(config.composer.may_generate_lock());

        let ignore = config.ignore.matcher().unwrap();
        assert!(ignore.is_match("@types/node"));
        assert!(!ignore.is_match("@babel/core"));
    }
}
