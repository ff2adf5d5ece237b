// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup shared by the MemFS binaries
//!
//! Binaries flatten [`CliLoggingArgs`] into their clap parser, optionally
//! merge in a [`LoggingConfig`] read from their config file, and call
//! [`CliLoggingArgs::init`] once at startup. `RUST_LOG` always overrides
//! the computed default filter.

pub mod logging_config;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use clap;
pub use logging_config::LoggingConfig;
pub use tracing::Level;

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// Structured JSON format
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Log level as accepted on the command line and in config files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliLogLevel {
    /// Only error conditions
    Error,
    /// Errors and warnings
    #[default]
    Warn,
    /// Errors, warnings, and informational messages
    Info,
    /// All above plus every filesystem mutation
    Debug,
    /// All above plus path resolution details
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Logging arguments for clap; use with `#[command(flatten)]`.
///
/// Console output goes to stderr so that it never interleaves with command
/// output on stdout. `--log-file` or `--log-dir` switch to file logging.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct CliLoggingArgs {
    /// Log verbosity level
    #[arg(long, value_enum, global = true, help = "Log verbosity level (default: warn)")]
    pub log_level: Option<CliLogLevel>,

    /// Log output format
    #[arg(long, value_enum, global = true, help = "Log output format (default: plaintext)")]
    pub log_format: Option<LogFormat>,

    /// Directory for log files
    #[arg(long, global = true, help = "Directory for log files")]
    pub log_dir: Option<String>,

    /// Log filename
    #[arg(long, global = true, help = "Log filename")]
    pub log_file: Option<String>,
}

impl CliLoggingArgs {
    /// Fill options not given on the command line from a config file section
    pub fn merge_config(mut self, config: &LoggingConfig) -> Self {
        self.log_level = self.log_level.or(config.level);
        self.log_format = self.log_format.or(config.format);
        if self.log_file.is_none() && self.log_dir.is_none() {
            self.log_file = config.file.clone();
        }
        self
    }

    /// Install the global subscriber for `component`
    pub fn init(self, component: &str) -> anyhow::Result<()> {
        let level = self.log_level.unwrap_or_default().into();
        let format = self.log_format.unwrap_or_default();

        if self.log_file.is_some() || self.log_dir.is_some() {
            let log_path = self.resolve_log_path(component);
            init_to_file(component, level, format, &log_path)
        } else {
            init(component, level, format)
        }
    }

    /// Resolve the log file path.
    ///
    /// An absolute `log_file` is used as is; a relative one is placed under
    /// `log_dir` when given. Without `log_file` the file is named after the
    /// component, in `log_dir` or the platform log directory.
    fn resolve_log_path(&self, component: &str) -> PathBuf {
        match (&self.log_file, &self.log_dir) {
            (Some(file), _) if Path::new(file).is_absolute() => PathBuf::from(file),
            (Some(file), Some(dir)) => Path::new(dir).join(file),
            (Some(file), None) => PathBuf::from(file),
            (None, Some(dir)) => Path::new(dir).join(format!("{}.log", component)),
            (None, None) => standard_log_path(component),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.log_level.is_none()
            && self.log_format.is_none()
            && self.log_dir.is_none()
            && self.log_file.is_none()
    }
}

/// Platform log location for `component`: the user data directory
/// (`~/.local/share/memfs` on Linux), falling back to `/tmp`.
pub fn standard_log_path(component: &str) -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    path.push("memfs");
    path.push(format!("{}.log", component));
    path
}

/// Log to stderr
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stderr)
}

/// Append log output to `log_path`, creating parent directories as needed
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    use std::fs;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = fs::OpenOptions::new().create(true).append(true).open(log_path)?;

    init_with_writer(component, default_level, format, std::sync::Mutex::new(log_file))
}

/// Initialize logging with a custom writer
///
/// Fails if a global subscriber is already installed.
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(component, default_level)));

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

/// Filter directive applying `level` globally and to the component and the core crate
fn default_filter(component: &str, level: Level) -> String {
    let target = component.replace('-', "_");
    format!("{level},{target}={level},memfs_core={level}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        logging: CliLoggingArgs,
    }

    #[test]
    fn test_cli_log_level_conversion() {
        assert_eq!(Level::from(CliLogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(CliLogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(CliLogLevel::Info), Level::INFO);
        assert_eq!(Level::from(CliLogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
        assert_eq!(CliLogLevel::default(), CliLogLevel::Warn);
        assert_eq!(CliLogLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(TestCli::try_parse_from(["memfs", "--log-format", "xml"]).is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_parse_cli_args() {
        let cli = TestCli::parse_from(["memfs", "--log-level", "trace", "--log-format", "json"]);
        assert_eq!(cli.logging.log_level, Some(CliLogLevel::Trace));
        assert_eq!(cli.logging.log_format, Some(LogFormat::Json));
        assert!(TestCli::parse_from(["memfs"]).logging.is_empty());
    }

    #[test]
    fn test_resolve_log_path() {
        let args = CliLoggingArgs {
            log_dir: Some("/var/log".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("memfs"), PathBuf::from("/var/log/memfs.log"));

        let args = CliLoggingArgs {
            log_dir: Some("/var/log".to_string()),
            log_file: Some("shell/run.log".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("memfs"), PathBuf::from("/var/log/shell/run.log"));

        let args = CliLoggingArgs {
            log_dir: Some("/var/log".to_string()),
            log_file: Some("/tmp/abs.log".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("memfs"), PathBuf::from("/tmp/abs.log"));

        let path = CliLoggingArgs::default().resolve_log_path("memfs");
        assert!(path.ends_with("memfs/memfs.log"));
    }

    #[test]
    fn test_merge_config_prefers_cli() {
        let config = LoggingConfig {
            level: Some(CliLogLevel::Debug),
            format: Some(LogFormat::Json),
            file: Some("memfs.log".to_string()),
        };
        let args = CliLoggingArgs {
            log_level: Some(CliLogLevel::Error),
            ..Default::default()
        }
        .merge_config(&config);

        assert_eq!(args.log_level, Some(CliLogLevel::Error));
        assert_eq!(args.log_format, Some(LogFormat::Json));
        assert_eq!(args.log_file.as_deref(), Some("memfs.log"));

        let args = CliLoggingArgs {
            log_dir: Some("/logs".to_string()),
            ..Default::default()
        }
        .merge_config(&config);
        assert_eq!(args.log_file, None);
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter("memfs-shell", Level::DEBUG),
            "DEBUG,memfs_shell=DEBUG,memfs_core=DEBUG"
        );
    }

    #[test]
    fn test_init_to_file_installs_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("memfs.log");

        init_to_file("memfs-test", Level::INFO, LogFormat::Plaintext, &path)
            .expect("first init should succeed");
        assert!(path.exists());
        assert!(init("memfs-test", Level::INFO, LogFormat::Plaintext).is_err());
    }
}
