// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for MemFS

use serde::{Deserialize, Serialize};

/// Stable handle to a node in the tree arena.
///
/// Handles carry a generation counter: once the node is deleted the handle
/// stops resolving (`FsError::NotFound`) even if its slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) const ROOT: NodeId = NodeId {
        index: 0,
        generation: 0,
    };
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Kind of a filesystem node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
            NodeKind::Symlink => write!(f, "symlink"),
        }
    }
}

/// File timestamps, seconds since the UNIX epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileTimes {
    pub created: i64,
    pub modified: i64,
    pub accessed: i64,
}

impl FileTimes {
    pub(crate) fn all(now: i64) -> Self {
        Self {
            created: now,
            modified: now,
            accessed: now,
        }
    }
}

/// Node attributes as reported by `stat`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub id: NodeId,
    pub kind: NodeKind,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub times: FileTimes,
}

impl Attributes {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == NodeKind::Symlink
    }
}

/// Directory entry information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
}

/// Security identity of the caller (uid and primary gid)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    pub const ROOT: Credentials = Credentials { uid: 0, gid: 0 };

    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Identity of the host process running the filesystem
    pub fn current_process() -> Self {
        // SAFETY: getuid/getgid cannot fail and have no preconditions.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            uid: uid as u32,
            gid: gid as u32,
        }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

/// Access class requested in a permission check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

/// Filesystem statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    pub nodes: u64,
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub content_bytes: u64,
}

/// Event kinds for filesystem change notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created { path: String, kind: NodeKind },
    Removed { path: String },
    Modified { path: String },
    Renamed { from: String, to: String },
}

/// Event sink trait for receiving filesystem change notifications
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn on_event(&self, evt: &EventKind);
}

/// Opaque event subscription identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}
