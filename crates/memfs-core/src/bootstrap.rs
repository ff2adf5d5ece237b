// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Standard directory layout for a fresh filesystem

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{FsError, FsResult};
use crate::{Credentials, MemFs};

/// Top-level directories and their exact modes
const STANDARD_DIRS: &[(&str, u32)] = &[
    ("/bin", 0o755),
    ("/etc", 0o755),
    ("/home", 0o755),
    ("/tmp", 0o777),
    ("/usr", 0o755),
    ("/var", 0o755),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BootstrapConfig {
    /// Name of the home directory created under `/home`
    pub user: String,
    /// Owner given to the home directory; the caller keeps it when unset
    pub home_owner: Option<Credentials>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            user: std::env::var("USER")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "user".to_string()),
            home_owner: None,
        }
    }
}

/// Create the standard layout and change into the user's home directory.
///
/// Directories that already exist are left alone, so populating twice is
/// harmless. Returns the home directory path.
pub fn populate(fs: &MemFs, config: &BootstrapConfig) -> FsResult<String> {
    for (path, mode) in STANDARD_DIRS {
        ensure_directory(fs, path, *mode)?;
    }

    let home = format!("/home/{}", config.user);
    let created = ensure_directory(fs, &home, 0o755)?;
    if let (true, Some(owner)) = (created, config.home_owner) {
        fs.chown(&home, owner.uid, owner.gid)?;
    }
    fs.change_directory(&home)?;

    info!(%home, "populated standard layout");
    Ok(home)
}

/// Returns whether the directory was newly created
fn ensure_directory(fs: &MemFs, path: &str, mode: u32) -> FsResult<bool> {
    match fs.create_directory(path, mode) {
        Ok(_) => {
            // creation is subject to the umask; the layout wants exact modes
            fs.chmod(path, mode)?;
            Ok(true)
        }
        Err(FsError::AlreadyExists) if fs.is_directory(path) => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FsConfig;

    fn config_for(user: &str) -> BootstrapConfig {
        BootstrapConfig {
            user: user.to_string(),
            home_owner: None,
        }
    }

    #[test]
    fn test_populate_layout() {
        let fs = MemFs::new(FsConfig::default());
        let home = populate(&fs, &config_for("alice")).expect("populate should succeed");

        assert_eq!(home, "/home/alice");
        assert_eq!(fs.current_directory(), "/home/alice");
        for (path, mode) in STANDARD_DIRS {
            let attrs = fs.stat(path).unwrap();
            assert!(attrs.is_dir(), "{path} should be a directory");
            assert_eq!(attrs.mode, *mode, "{path} mode");
        }
        let names: Vec<_> =
            fs.list_directory("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["bin", "etc", "home", "tmp", "usr", "var"]);
    }

    #[test]
    fn test_populate_is_idempotent() {
        let fs = MemFs::new(FsConfig::default());
        populate(&fs, &config_for("alice")).unwrap();
        fs.create_file("/home/alice/keep", 0o644).unwrap();

        populate(&fs, &config_for("alice")).unwrap();
        assert!(fs.is_file("/home/alice/keep"));
        assert_eq!(fs.stats().directories, 8);
    }

    #[test]
    fn test_populate_hands_home_to_owner() {
        let fs = MemFs::new(FsConfig::default());
        let config = BootstrapConfig {
            user: "bob".to_string(),
            home_owner: Some(Credentials::new(1001, 1001)),
        };
        populate(&fs, &config).unwrap();

        let attrs = fs.stat("/home/bob").unwrap();
        assert_eq!((attrs.uid, attrs.gid), (1001, 1001));
        assert_eq!(fs.stat("/home").unwrap().uid, 0);
    }

    #[test]
    fn test_populate_fails_when_a_file_is_in_the_way() {
        let fs = MemFs::new(FsConfig::default());
        fs.create_file("/tmp", 0o644).unwrap();
        assert_eq!(populate(&fs, &config_for("alice")).unwrap_err(), FsError::AlreadyExists);
    }
}
