//! Configuration management for magicmount

use crate::error::{Error, Result};
use crate::layout::Layout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Partitions that are mounted on their own when they exist outside /system
pub const DEFAULT_PARTITIONS: &[&str] = &["vendor", "product", "system_ext"];

/// Default tmpfs mount options
pub const DEFAULT_TMPFS_MODE: &str = "mode=755";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where destinations, mirrors and modules live
    pub layout: Layout,

    /// Modules to load, in priority order. Discovered from the module
    /// root when unset.
    pub modules: Option<Vec<String>>,

    /// Partitions hoisted out of /system
    pub partitions: Vec<String>,

    /// Files injected ahead of all modules
    pub inject: Vec<InjectConfig>,

    /// Mount behaviour
    pub mount: MountConfig,
}

/// One injected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectConfig {
    /// Destination inside /system
    pub path: String,
    /// File to bind onto it
    pub source: PathBuf,
}

/// Mount configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Remount bind mounts read-only
    pub read_only: bool,

    /// Options for synthesized tmpfs directories
    pub tmpfs_mode: String,

    /// Log mounts instead of performing them
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            layout: Layout::default(),
            modules: None,
            partitions: DEFAULT_PARTITIONS.iter().map(|p| p.to_string()).collect(),
            inject: Vec::new(),
            mount: MountConfig::default(),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            read_only: true,
            tmpfs_mode: DEFAULT_TMPFS_MODE.to_string(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides, for running without a file
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env_path("MAGICMOUNT_SYSROOT") {
            self.layout.sysroot = path;
        }
        if let Some(path) = env_path("MAGICMOUNT_MIRROR_DIR") {
            self.layout.mirror_dir = path;
        }
        if let Some(path) = env_path("MAGICMOUNT_MODULE_ROOT") {
            self.layout.module_root = path;
        }
        if let Ok(value) = std::env::var("MAGICMOUNT_DRY_RUN") {
            match value.trim() {
                "1" | "true" | "yes" => self.mount.dry_run = true,
                "0" | "false" | "no" => self.mount.dry_run = false,
                _ => {}
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("sysroot", &self.layout.sysroot),
            ("mirror_dir", &self.layout.mirror_dir),
            ("module_root", &self.layout.module_root),
        ] {
            if !path.is_absolute() {
                return Err(Error::InvalidConfig(format!(
                    "{} must be an absolute path: {}",
                    name,
                    path.display()
                )));
            }
        }

        for part in &self.partitions {
            if part.is_empty() || part.contains('/') {
                return Err(Error::InvalidConfig(format!(
                    "Invalid partition name: {:?}",
                    part
                )));
            }
        }

        if let Some(modules) = &self.modules {
            if let Some(bad) = modules.iter().find(|m| m.is_empty() || m.contains('/')) {
                return Err(Error::InvalidConfig(format!("Invalid module name: {:?}", bad)));
            }
        }

        for entry in &self.inject {
            if !entry.path.starts_with("/system/") {
                return Err(Error::InvalidConfig(format!(
                    "Injected path must be inside /system: {}",
                    entry.path
                )));
            }
            if !entry.source.is_absolute() {
                return Err(Error::InvalidConfig(format!(
                    "Injected source must be an absolute path: {}",
                    entry.source.display()
                )));
            }
        }

        Ok(())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.partitions, vec!["vendor", "product", "system_ext"]);
        assert!(config.mount.read_only);
        assert!(config.modules.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.modules = Some(vec!["alpha".into(), "beta".into()]);
        config.inject.push(InjectConfig {
            path: "/system/bin/tool".into(),
            source: PathBuf::from("/data/adb/tool"),
        });
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.modules, config.modules);
        assert_eq!(loaded.inject, config.inject);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "mount": { "dry_run": true } }"#).unwrap();

        let config: Config = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(config.mount.dry_run);
        assert!(config.mount.read_only);
        assert_eq!(config.layout, Layout::default());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.layout.mirror_dir = PathBuf::from("relative");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::default();
        config.partitions.push("a/b".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.modules = Some(vec!["../escape".into()]);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.inject.push(InjectConfig {
            path: "/vendor/bin/x".into(),
            source: PathBuf::from("/x"),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::load(dir.path().join("nope.json")),
            Err(Error::Config(_))
        ));
    }
}
