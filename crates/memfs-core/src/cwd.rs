// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Working-directory state

use crate::config::StaleCwdPolicy;
use crate::error::{FsError, FsResult};
use crate::tree::Tree;
use crate::{NodeId, NodeKind};

/// Directory used as the base for relative resolution.
///
/// The node handle is authoritative; `path` caches the canonical path last
/// observed for it so the session can still report where it was after the
/// directory is deleted.
#[derive(Clone, Debug)]
pub(crate) struct WorkingDirectory {
    node: NodeId,
    path: String,
    policy: StaleCwdPolicy,
}

impl WorkingDirectory {
    pub fn new(policy: StaleCwdPolicy) -> Self {
        Self {
            node: NodeId::ROOT,
            path: "/".to_string(),
            policy,
        }
    }

    pub fn set(&mut self, node: NodeId, path: String) {
        self.node = node;
        self.path = path;
    }

    /// True once the directory has been deleted
    pub fn is_stale(&self, tree: &Tree) -> bool {
        !tree.get(self.node).is_ok_and(|n| n.kind() == NodeKind::Directory)
    }

    /// Node to resolve relative paths from
    pub fn base(&mut self, tree: &Tree) -> FsResult<NodeId> {
        if !self.is_stale(tree) {
            return Ok(self.node);
        }
        match self.policy {
            StaleCwdPolicy::Fail => {
                tracing::warn!(path = %self.path, "working directory no longer exists");
                Err(FsError::NotFound)
            }
            StaleCwdPolicy::FallbackToRoot => {
                tracing::warn!(path = %self.path, "working directory vanished, falling back to /");
                self.set(NodeId::ROOT, "/".to_string());
                Ok(NodeId::ROOT)
            }
        }
    }

    /// Canonical path of the working directory.
    ///
    /// Follows renames of the directory or its ancestors. A stale directory
    /// reports its last known path under [`StaleCwdPolicy::Fail`].
    pub fn path(&mut self, tree: &Tree) -> String {
        if !self.is_stale(tree) {
            if let Ok(path) = tree.path_of(self.node) {
                self.path = path;
            }
            return self.path.clone();
        }
        match self.policy {
            StaleCwdPolicy::Fail => self.path.clone(),
            StaleCwdPolicy::FallbackToRoot => {
                self.set(NodeId::ROOT, "/".to_string());
                self.path.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::FsLimits;
    use crate::tree::NodeData;
    use crate::Credentials;
    use std::sync::Arc;

    fn tree_with_dir() -> (Tree, NodeId) {
        let mut tree = Tree::new(Arc::new(SystemClock), FsLimits::default(), Credentials::ROOT);
        let dir = tree
            .insert(
                NodeId::ROOT,
                "work",
                NodeData::Directory {
                    children: Vec::new(),
                },
                0o755,
                Credentials::ROOT,
            )
            .unwrap();
        (tree, dir)
    }

    #[test]
    fn test_path_follows_rename() {
        let (mut tree, dir) = tree_with_dir();
        let mut cwd = WorkingDirectory::new(StaleCwdPolicy::Fail);
        cwd.set(dir, "/work".to_string());

        tree.relink(dir, NodeId::ROOT, "moved").unwrap();
        assert_eq!(cwd.path(&tree), "/moved");
        assert_eq!(cwd.base(&tree).unwrap(), dir);
    }

    #[test]
    fn test_stale_fail_policy() {
        let (mut tree, dir) = tree_with_dir();
        let mut cwd = WorkingDirectory::new(StaleCwdPolicy::Fail);
        cwd.set(dir, "/work".to_string());

        tree.remove(dir).unwrap();
        assert!(cwd.is_stale(&tree));
        assert_eq!(cwd.base(&tree).unwrap_err(), FsError::NotFound);
        assert_eq!(cwd.path(&tree), "/work");
    }

    #[test]
    fn test_stale_fallback_policy() {
        let (mut tree, dir) = tree_with_dir();
        let mut cwd = WorkingDirectory::new(StaleCwdPolicy::FallbackToRoot);
        cwd.set(dir, "/work".to_string());

        tree.remove(dir).unwrap();
        assert_eq!(cwd.base(&tree).unwrap(), NodeId::ROOT);
        assert_eq!(cwd.path(&tree), "/");
        assert!(!cwd.is_stale(&tree));
    }
}
