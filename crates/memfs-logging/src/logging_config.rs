// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging configuration types

use serde::{Deserialize, Serialize};

use crate::{CliLogLevel, LogFormat};

/// `[logging]` section of a binary's config file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Logging verbosity level
    #[serde(rename = "log-level")]
    pub level: Option<CliLogLevel>,
    #[serde(rename = "log-format")]
    pub format: Option<LogFormat>,
    /// Log file path
    #[serde(rename = "log-file")]
    pub file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_section() {
        let config: LoggingConfig =
            toml::from_str("log-level = \"debug\"\nlog-file = \"/tmp/memfs.log\"").unwrap();
        assert_eq!(config.level, Some(CliLogLevel::Debug));
        assert_eq!(config.format, None);
        assert_eq!(config.file.as_deref(), Some("/tmp/memfs.log"));
    }
}
