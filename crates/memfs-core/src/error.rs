// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for MemFS Core

use std::io;

/// Core filesystem error type
///
/// Every operation of [`crate::MemFs`] reports exactly one of these or succeeds.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("not a regular file")]
    NotAFile,
    #[error("directory not empty")]
    NotEmpty,
    #[error("permission denied")]
    PermissionDenied,
    #[error("limit exceeded")]
    LimitExceeded,
    #[error("too many levels of symbolic links")]
    TooManySymlinks,
    #[error("name not allowed")]
    InvalidName,
    #[error("invalid argument")]
    InvalidArgument,
}

pub type FsResult<T> = Result<T, FsError>;

/// Errors raised while loading an [`crate::FsConfig`]
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}
