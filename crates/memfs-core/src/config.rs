// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for MemFS Core

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level filesystem configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FsConfig {
    pub limits: FsLimits,
    pub security: SecurityPolicy,
    pub cwd: CwdPolicy,
    /// Deliver change notifications to subscribed sinks
    pub track_events: bool,
}

/// Structural limits enforced by the tree store and resolver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FsLimits {
    /// Maximum number of entries in a single directory
    pub max_children: usize,
    /// Maximum number of symlink expansions during one path resolution
    pub max_symlink_depth: u32,
    /// Maximum length of a single path component, in bytes
    pub max_name_len: usize,
    /// Largest size a regular file may reach through write or truncate, in bytes
    pub max_file_size: u64,
}

impl Default for FsLimits {
    fn default() -> Self {
        Self {
            max_children: 128,
            max_symlink_depth: 8,
            max_name_len: 255,
            max_file_size: 64 * 1024 * 1024,
        }
    }
}

/// Access control policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SecurityPolicy {
    pub enforce_permissions: bool,
    /// uid 0 passes every permission check
    pub root_bypass: bool,
    /// Bits cleared from the mode of newly created nodes
    pub umask: u32,
    /// Initial caller identity and owner of the root directory
    pub default_uid: u32,
    pub default_gid: u32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            enforce_permissions: true,
            root_bypass: true,
            umask: 0o022,
            default_uid: 0,
            default_gid: 0,
        }
    }
}

/// What happens when the working directory is deleted out from under a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleCwdPolicy {
    /// Relative resolutions fail with `NotFound` until the next `change_directory`
    #[default]
    Fail,
    /// The working directory silently resets to `/`
    FallbackToRoot,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CwdPolicy {
    pub stale_policy: StaleCwdPolicy,
}

impl FsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load a config file; the extension (`.toml` or `.json`) selects the format
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match ext {
            "toml" => Self::from_toml_str(&std::fs::read_to_string(path)?),
            "json" => Self::from_json_bytes(&std::fs::read(path)?),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FsConfig::default();
        assert_eq!(config.limits.max_children, 128);
        assert_eq!(config.limits.max_symlink_depth, 8);
        assert_eq!(config.limits.max_file_size, 64 * 1024 * 1024);
        assert_eq!(config.security.umask, 0o022);
        assert!(config.security.enforce_permissions);
        assert_eq!(config.cwd.stale_policy, StaleCwdPolicy::Fail);
        assert!(!config.track_events);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FsConfig::from_toml_str(
            r#"
            track-events = true

            [limits]
            max-children = 4

            [cwd]
            stale-policy = "fallback_to_root"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.limits.max_children, 4);
        assert_eq!(config.limits.max_symlink_depth, 8);
        assert_eq!(config.cwd.stale_policy, StaleCwdPolicy::FallbackToRoot);
        assert!(config.track_events);
        assert_eq!(config.security, SecurityPolicy::default());
    }

    #[test]
    fn test_json_config() {
        let config =
            FsConfig::from_json_bytes(br#"{"security": {"umask": 63, "root-bypass": false}}"#)
                .expect("config should parse");
        assert_eq!(config.security.umask, 0o077);
        assert!(!config.security.root_bypass);
        assert!(config.security.enforce_permissions);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memfs.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[limits]\nmax-symlink-depth = 2\nmax-file-size = 4096").unwrap();
        drop(file);

        let config = FsConfig::load(&path).expect("config should load");
        assert_eq!(config.limits.max_symlink_depth, 2);
        assert_eq!(config.limits.max_file_size, 4096);
        assert_eq!(config.limits.max_children, 128);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memfs.yaml");
        std::fs::write(&path, "limits: {}").unwrap();

        let err = FsConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "yaml"));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = FsConfig::from_toml_str("[limits\nmax-children = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
