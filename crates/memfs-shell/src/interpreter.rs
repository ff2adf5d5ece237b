// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Executes parsed commands against a filesystem

use std::io::{self, BufRead, Write};

use memfs_core::{FsError, MemFs, NodeKind};
use tracing::{debug, warn};

use crate::command::{Command, ParseError};

#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    #[error("{path}: {source}")]
    Fs {
        path: String,
        #[source]
        source: FsError,
    },
    #[error("{line}: {source}")]
    Parse {
        line: String,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Attach the offending path to a filesystem error
fn at(path: &str) -> impl FnOnce(FsError) -> ShellError + '_ {
    move |source| ShellError::Fs {
        path: path.to_string(),
        source,
    }
}

fn kind_marker(kind: NodeKind) -> char {
    match kind {
        NodeKind::File => '-',
        NodeKind::Directory => 'd',
        NodeKind::Symlink => 'l',
    }
}

/// Command interpreter bound to one filesystem instance
pub struct Shell {
    fs: MemFs,
}

impl Shell {
    pub fn new(fs: MemFs) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &MemFs {
        &self.fs
    }

    pub fn into_fs(self) -> MemFs {
        self.fs
    }

    /// Run a script, one command per line.
    ///
    /// Failed commands are reported on `err` as `memfs: <path>: <error>` and do
    /// not stop the script. Returns the number of failed commands.
    pub fn run_script<R: BufRead>(
        &self,
        input: R,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<usize> {
        let mut failures = 0;
        for line in input.lines() {
            match self.run_line(&line?, out) {
                Ok(()) => {}
                Err(ShellError::Io(e)) => return Err(e),
                Err(e) => {
                    failures += 1;
                    writeln!(err, "memfs: {e}")?;
                }
            }
        }
        Ok(failures)
    }

    pub fn run_line(&self, line: &str, out: &mut dyn Write) -> Result<(), ShellError> {
        let command = Command::parse(line).map_err(|source| ShellError::Parse {
            line: line.trim().to_string(),
            source,
        })?;
        match command {
            Some(command) => self.execute(&command, out),
            None => Ok(()),
        }
    }

    pub fn execute(&self, command: &Command, out: &mut dyn Write) -> Result<(), ShellError> {
        debug!(?command, "executing");
        let fs = &self.fs;
        let result = match command {
            Command::Pwd => {
                writeln!(out, "{}", fs.current_directory())?;
                Ok(())
            }
            Command::Cd(path) => fs.change_directory(path).map_err(at(path)),
            Command::Ls(path) => {
                let path = path.as_deref().unwrap_or(".");
                for entry in fs.list_directory(path).map_err(at(path))? {
                    writeln!(out, "{} {:>8} {}", kind_marker(entry.kind), entry.size, entry.name)?;
                }
                Ok(())
            }
            Command::Mkdir(path) => fs.create_directory(path, 0o777).map(drop).map_err(at(path)),
            Command::Touch(path) => self.ensure_file(path),
            Command::Write { path, offset, text } => {
                self.ensure_file(path)?;
                fs.write(path, *offset, text.as_bytes()).map(drop).map_err(at(path))
            }
            Command::Append { path, text } => {
                self.ensure_file(path)?;
                let size = fs.stat(path).map_err(at(path))?.size;
                fs.write(path, size, text.as_bytes()).map(drop).map_err(at(path))
            }
            Command::Cat(path) => {
                let content = fs.read_to_end(path).map_err(at(path))?;
                out.write_all(&content)?;
                if !content.is_empty() && !content.ends_with(b"\n") {
                    writeln!(out)?;
                }
                Ok(())
            }
            Command::Rm(path) => fs.delete(path).map_err(at(path)),
            Command::Mv { from, to } => fs.rename(from, to).map_err(at(from)),
            Command::Cp { from, to } => fs.copy_file(from, to).map(drop).map_err(at(from)),
            Command::Symlink { target, link } => {
                fs.create_symlink(link, target).map(drop).map_err(at(link))
            }
            Command::Readlink(path) => {
                writeln!(out, "{}", fs.read_link(path).map_err(at(path))?)?;
                Ok(())
            }
            Command::Chmod { mode, path } => fs.chmod(path, *mode).map_err(at(path)),
            Command::Chown { uid, gid, path } => fs.chown(path, *uid, *gid).map_err(at(path)),
            Command::Truncate { size, path } => fs.truncate(path, *size).map_err(at(path)),
            Command::Stat(path) => {
                let attrs = fs.stat(path).map_err(at(path))?;
                writeln!(
                    out,
                    "{} {} size={} mode={:04o} uid={} gid={} created={} modified={} accessed={}",
                    fs.canonical_path(path).map_err(at(path))?,
                    attrs.kind,
                    attrs.size,
                    attrs.mode,
                    attrs.uid,
                    attrs.gid,
                    attrs.times.created,
                    attrs.times.modified,
                    attrs.times.accessed,
                )?;
                Ok(())
            }
            Command::Stats => {
                let stats = fs.stats();
                writeln!(
                    out,
                    "nodes={} directories={} files={} symlinks={} bytes={}",
                    stats.nodes, stats.directories, stats.files, stats.symlinks, stats.content_bytes
                )?;
                Ok(())
            }
        };

        if let Err(ShellError::Fs { path, source }) = &result {
            warn!(%path, error = %source, "command failed");
        }
        result
    }

    /// Create `path` as an empty file unless something already exists there
    fn ensure_file(&self, path: &str) -> Result<(), ShellError> {
        match self.fs.create_file(path, 0o666) {
            Ok(_) => Ok(()),
            Err(FsError::AlreadyExists) => Ok(()),
            Err(source) => Err(at(path)(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memfs_core::FsConfig;

    fn run(shell: &Shell, line: &str) -> String {
        let mut out = Vec::new();
        shell.run_line(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_ls_format() {
        let shell = Shell::new(MemFs::new(FsConfig::default()));
        run(&shell, "mkdir /d");
        run(&shell, "write /d/f 0 hello");
        run(&shell, "ln -s f /d/l");

        assert_eq!(run(&shell, "ls /d"), "-        5 f\nl        1 l\n");
    }

    #[test]
    fn test_errors_carry_the_path() {
        let shell = Shell::new(MemFs::new(FsConfig::default()));
        let err = shell.run_line("cat /missing", &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "/missing: not found");

        let err = shell.run_line("chmod rw /x", &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "chmod rw /x: invalid number: rw");
    }

    #[test]
    fn test_touch_keeps_existing_content() {
        let shell = Shell::new(MemFs::new(FsConfig::default()));
        run(&shell, "write /f 0 keep");
        run(&shell, "touch /f");
        assert_eq!(run(&shell, "cat /f"), "keep\n");

        run(&shell, "mkdir /d");
        run(&shell, "touch /d");
        assert!(shell.fs().is_directory("/d"));
    }
}
