// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! MemFS Core - an in-memory hierarchical filesystem
//!
//! A single [`MemFs`] owns a tree of directories, regular files and symbolic
//! links together with a working directory and a caller identity. Paths are
//! resolved against the working directory, POSIX-style permission bits are
//! checked on every access, and each operation runs inside one critical
//! section so concurrent callers always observe a consistent tree.

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod permissions;
pub mod resolve;
pub mod types;
pub mod vfs;

mod cwd;
mod tree;

#[cfg(test)]
mod test_scenarios;

pub use bootstrap::{BootstrapConfig, populate};
pub use clock::{Clock, SystemClock};
pub use config::{CwdPolicy, FsConfig, FsLimits, SecurityPolicy, StaleCwdPolicy};
pub use error::{ConfigError, FsError, FsResult};
pub use types::*;
pub use vfs::MemFs;
