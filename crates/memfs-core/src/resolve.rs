// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path resolution over the tree store

use crate::config::SecurityPolicy;
use crate::error::{FsError, FsResult};
use crate::permissions;
use crate::tree::Tree;
use crate::{Access, Credentials, NodeId, NodeKind};

pub const SEPARATOR: char = '/';

/// Split a path into its non-empty components
pub fn components(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|c| !c.is_empty()).collect()
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// Lexically normalise `path` against the absolute directory `cwd`.
///
/// `.` is dropped, `..` removes the previous component (and stops at `/`),
/// repeated separators collapse. The tree is not consulted, so symlinks are
/// not expanded.
pub fn normalize(cwd: &str, path: &str) -> String {
    let mut stack: Vec<&str> = if is_absolute(path) {
        Vec::new()
    } else {
        components(cwd)
    };
    for component in components(path) {
        match component {
            "." => {}
            ".." => {
                stack.pop();
            }
            name => stack.push(name),
        }
    }
    if stack.is_empty() {
        return "/".to_string();
    }
    stack.iter().fold(String::new(), |mut acc, name| {
        acc.push(SEPARATOR);
        acc.push_str(name);
        acc
    })
}

/// Walks paths through a tree on behalf of one caller
pub(crate) struct Resolver<'a> {
    tree: &'a Tree,
    policy: &'a SecurityPolicy,
    caller: Credentials,
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a Tree, policy: &'a SecurityPolicy, caller: Credentials) -> Self {
        Self {
            tree,
            policy,
            caller,
        }
    }

    /// Resolve `path` starting at `base` (or at the root for absolute paths).
    ///
    /// Symlinks in intermediate components are always followed; the final
    /// component is followed only when `follow_final` is set.
    pub fn resolve(&self, base: NodeId, path: &str, follow_final: bool) -> FsResult<NodeId> {
        let start = if is_absolute(path) { NodeId::ROOT } else { base };
        let mut expansions = 0;
        let resolved = self.walk(start, &components(path), follow_final, &mut expansions)?;
        tracing::trace!(path, %resolved, expansions, "resolved path");
        Ok(resolved)
    }

    /// Resolve everything but the last component of `path`, which must name
    /// an entry inside a directory. Returns that directory and the name.
    pub fn resolve_parent(&self, base: NodeId, path: &str) -> FsResult<(NodeId, String)> {
        let start = if is_absolute(path) { NodeId::ROOT } else { base };
        let parts = components(path);
        let Some((name, dir_parts)) = parts.split_last() else {
            return Err(FsError::InvalidName);
        };
        self.tree.validate_name(name)?;

        let mut expansions = 0;
        let parent = self.walk(start, dir_parts, true, &mut expansions)?;
        if self.tree.get(parent)?.kind() != NodeKind::Directory {
            return Err(FsError::NotADirectory);
        }
        Ok((parent, name.to_string()))
    }

    fn walk(
        &self,
        start: NodeId,
        parts: &[&str],
        follow_final: bool,
        expansions: &mut u32,
    ) -> FsResult<NodeId> {
        let mut current = start;
        for (i, part) in parts.iter().enumerate() {
            let is_last = i + 1 == parts.len();
            let node = self.tree.get(current)?;
            if node.kind() != NodeKind::Directory {
                return Err(FsError::NotADirectory);
            }

            match *part {
                "." => continue,
                ".." => {
                    current = node.parent;
                    continue;
                }
                name => {
                    if !permissions::allowed(self.policy, node, self.caller, Access::Execute) {
                        return Err(FsError::PermissionDenied);
                    }
                    let child = self.tree.find_child(current, name)?.ok_or(FsError::NotFound)?;
                    let child_node = self.tree.get(child)?;

                    match child_node.symlink_target() {
                        Some(target) if !is_last || follow_final => {
                            *expansions += 1;
                            if *expansions > self.tree.limits().max_symlink_depth {
                                return Err(FsError::TooManySymlinks);
                            }
                            // relative targets are interpreted from the link's directory
                            let base = if is_absolute(target) { NodeId::ROOT } else { current };
                            current = self.walk(base, &components(target), true, expansions)?;
                        }
                        _ => current = child,
                    }
                }
            }
        }
        Ok(current)
    }
}
