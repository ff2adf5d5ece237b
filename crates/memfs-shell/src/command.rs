// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Parsing of shell command lines

/// One parsed shell command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Pwd,
    Cd(String),
    Ls(Option<String>),
    Mkdir(String),
    Touch(String),
    Write {
        path: String,
        offset: u64,
        text: String,
    },
    Append {
        path: String,
        text: String,
    },
    Cat(String),
    Rm(String),
    Mv {
        from: String,
        to: String,
    },
    Cp {
        from: String,
        to: String,
    },
    Symlink {
        target: String,
        link: String,
    },
    Readlink(String),
    Chmod {
        mode: u32,
        path: String,
    },
    Chown {
        uid: u32,
        gid: u32,
        path: String,
    },
    Truncate {
        size: u64,
        path: String,
    },
    Stat(String),
    Stats,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Split off the first whitespace-delimited word
fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], s[end..].trim_start()),
        None => (s, ""),
    }
}

/// Exactly `N` words, or the usage message
fn words<const N: usize>(rest: &str, usage: &'static str) -> Result<[String; N], ParseError> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() != N {
        return Err(ParseError::Usage(usage));
    }
    Ok(std::array::from_fn(|i| parts[i].to_string()))
}

/// First word plus the untouched remainder, which must be non-empty
fn word_and_text(rest: &str, usage: &'static str) -> Result<(String, String), ParseError> {
    let (word, text) = next_word(rest);
    if word.is_empty() || text.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    Ok((word.to_string(), text.to_string()))
}

fn number<T: std::str::FromStr>(s: &str) -> Result<T, ParseError> {
    s.parse().map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

fn octal(s: &str) -> Result<u32, ParseError> {
    u32::from_str_radix(s, 8).map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

impl Command {
    /// Parse one script line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (name, rest) = next_word(line);

        let command = match name {
            "pwd" => {
                let [] = words::<0>(rest, "pwd")?;
                Command::Pwd
            }
            "cd" => {
                let [path] = words::<1>(rest, "cd <path>")?;
                Command::Cd(path)
            }
            "ls" => match rest.split_whitespace().collect::<Vec<_>>()[..] {
                [] => Command::Ls(None),
                [path] => Command::Ls(Some(path.to_string())),
                _ => return Err(ParseError::Usage("ls [path]")),
            },
            "mkdir" => {
                let [path] = words::<1>(rest, "mkdir <path>")?;
                Command::Mkdir(path)
            }
            "touch" => {
                let [path] = words::<1>(rest, "touch <path>")?;
                Command::Touch(path)
            }
            "write" => {
                const USAGE: &str = "write <path> <offset> <text>";
                let (path, rest) = next_word(rest);
                let (offset, text) = word_and_text(rest, USAGE)?;
                if path.is_empty() {
                    return Err(ParseError::Usage(USAGE));
                }
                Command::Write {
                    path: path.to_string(),
                    offset: number(&offset)?,
                    text,
                }
            }
            "append" => {
                let (path, text) = word_and_text(rest, "append <path> <text>")?;
                Command::Append { path, text }
            }
            "cat" => {
                let [path] = words::<1>(rest, "cat <path>")?;
                Command::Cat(path)
            }
            "rm" => {
                let [path] = words::<1>(rest, "rm <path>")?;
                Command::Rm(path)
            }
            "mv" => {
                let [from, to] = words::<2>(rest, "mv <from> <to>")?;
                Command::Mv { from, to }
            }
            "cp" => {
                let [from, to] = words::<2>(rest, "cp <from> <to>")?;
                Command::Cp { from, to }
            }
            "ln" => {
                let [flag, target, link] = words::<3>(rest, "ln -s <target> <link>")?;
                if flag != "-s" {
                    return Err(ParseError::Usage("ln -s <target> <link>"));
                }
                Command::Symlink { target, link }
            }
            "readlink" => {
                let [path] = words::<1>(rest, "readlink <path>")?;
                Command::Readlink(path)
            }
            "chmod" => {
                let [mode, path] = words::<2>(rest, "chmod <octal-mode> <path>")?;
                Command::Chmod {
                    mode: octal(&mode)?,
                    path,
                }
            }
            "chown" => {
                const USAGE: &str = "chown <uid>:<gid> <path>";
                let [owner, path] = words::<2>(rest, USAGE)?;
                let (uid, gid) = owner.split_once(':').ok_or(ParseError::Usage(USAGE))?;
                Command::Chown {
                    uid: number(uid)?,
                    gid: number(gid)?,
                    path,
                }
            }
            "truncate" => {
                let [size, path] = words::<2>(rest, "truncate <size> <path>")?;
                Command::Truncate {
                    size: number(&size)?,
                    path,
                }
            }
            "stat" => {
                let [path] = words::<1>(rest, "stat <path>")?;
                Command::Stat(path)
            }
            "stats" => {
                let [] = words::<0>(rest, "stats")?;
                Command::Stats
            }
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}
