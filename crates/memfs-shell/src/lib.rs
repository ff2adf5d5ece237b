// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Command interpreter driving a [`memfs_core::MemFs`] from scripts

pub mod command;
pub mod config;
mod interpreter;

pub use command::{Command, ParseError};
pub use config::ShellConfig;
pub use interpreter::{Shell, ShellError};
