// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Shell configuration file

use anyhow::{Context, Result, bail};
use memfs_core::{BootstrapConfig, FsConfig};
use memfs_logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Filesystem settings at the top level plus `[bootstrap]` and `[logging]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ShellConfig {
    #[serde(flatten)]
    pub fs: FsConfig,
    pub bootstrap: BootstrapConfig,
    pub logging: LoggingConfig,
}

impl ShellConfig {
    /// Load a `.toml` or `.json` config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("invalid TOML in {}", path.display()))?,
            Some("json") => serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON in {}", path.display()))?,
            _ => bail!("unsupported config format: {}", path.display()),
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memfs_core::StaleCwdPolicy;
    use memfs_logging::CliLogLevel;

    #[test]
    fn test_load_toml_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memfs.toml");
        std::fs::write(
            &path,
            r#"
            track-events = true

            [limits]
            max-children = 16

            [cwd]
            stale-policy = "fallback_to_root"

            [bootstrap]
            user = "carol"

            [logging]
            log-level = "debug"
            "#,
        )
        .unwrap();

        let config = ShellConfig::load(&path).expect("config should load");
        assert!(config.fs.track_events);
        assert_eq!(config.fs.limits.max_children, 16);
        assert_eq!(config.fs.cwd.stale_policy, StaleCwdPolicy::FallbackToRoot);
        assert_eq!(config.bootstrap.user, "carol");
        assert_eq!(config.logging.level, Some(CliLogLevel::Debug));
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memfs.json");
        std::fs::write(&path, r#"{"security": {"umask": 0}, "bootstrap": {"user": "dan"}}"#)
            .unwrap();

        let config = ShellConfig::load(&path).unwrap();
        assert_eq!(config.fs.security.umask, 0);
        assert_eq!(config.bootstrap.user, "dan");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memfs.ini");
        std::fs::write(&path, "").unwrap();
        assert!(ShellConfig::load(&path).is_err());
    }
}
