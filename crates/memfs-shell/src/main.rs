// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use memfs_core::{Credentials, MemFs, populate};
use memfs_logging::CliLoggingArgs;
use memfs_shell::{Shell, ShellConfig};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run filesystem commands against a fresh in-memory MemFS"
)]
struct Cli {
    /// Config file (.toml or .json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name of the home directory created under /home
    #[arg(long)]
    user: Option<String>,

    /// Run commands as <uid>:<gid>, or `self` for the host identity; also owns the home directory
    #[arg(long = "as", value_name = "UID:GID|self", value_parser = parse_identity)]
    identity: Option<Credentials>,

    /// Start from an empty root instead of the standard layout
    #[arg(long)]
    bare: bool,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Execute a script, one command per line ('-' reads stdin)
    Run { script: PathBuf },
    /// Execute a single command
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn parse_identity(s: &str) -> Result<Credentials> {
    if s == "self" {
        return Ok(Credentials::current_process());
    }
    let (uid, gid) = s.split_once(':').ok_or_else(|| anyhow!("expected <uid>:<gid>"))?;
    Ok(Credentials::new(
        uid.parse().context("invalid uid")?,
        gid.parse().context("invalid gid")?,
    ))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ShellConfig::load(path)?,
        None => ShellConfig::default(),
    };
    cli.logging.clone().merge_config(&config.logging).init("memfs-shell")?;

    if let Some(user) = cli.user {
        config.bootstrap.user = user;
    }
    if cli.identity.is_some() {
        config.bootstrap.home_owner = cli.identity;
    }

    let fs = MemFs::new(config.fs);
    if !cli.bare {
        populate(&fs, &config.bootstrap).context("failed to populate standard layout")?;
    }
    if let Some(identity) = cli.identity {
        fs.set_credentials(identity);
    }
    let shell = Shell::new(fs);

    let stdout = io::stdout();
    let stderr = io::stderr();
    let failures = match cli.command {
        Mode::Run { script } if script.as_os_str() == "-" => {
            shell.run_script(io::stdin().lock(), &mut stdout.lock(), &mut stderr.lock())?
        }
        Mode::Run { script } => {
            let file = File::open(&script)
                .with_context(|| format!("failed to open script {}", script.display()))?;
            shell.run_script(BufReader::new(file), &mut stdout.lock(), &mut stderr.lock())?
        }
        Mode::Exec { command } => {
            let line = command.join(" ");
            shell.run_script(line.as_bytes(), &mut stdout.lock(), &mut stderr.lock())?
        }
    };

    let released = shell.into_fs().shutdown();
    tracing::debug!(failures, released, "session finished");
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
