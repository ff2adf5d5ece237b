// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Arena-backed tree store.
//!
//! Nodes live in a slot vector addressed by generational [`NodeId`]s. Parent
//! links and child lists are ids into the same arena, so moving a node between
//! directories is an id rewrite and a deleted node can never be reached
//! through a stale handle. The tree is the only place that mutates structure;
//! every mutating method validates first and touches state last, so a failed
//! call leaves the tree exactly as it was.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::FsLimits;
use crate::error::{FsError, FsResult};
use crate::{Attributes, Credentials, FileTimes, FsStats, NodeId, NodeKind};

/// Payload of a node, by kind
#[derive(Clone, Debug)]
pub(crate) enum NodeData {
    File { content: Vec<u8> },
    Directory { children: Vec<NodeId> },
    Symlink { target: String },
}

/// Filesystem node
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub name: String,
    pub data: NodeData,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub times: FileTimes,
    pub parent: NodeId,
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::File { .. } => NodeKind::File,
            NodeData::Directory { .. } => NodeKind::Directory,
            NodeData::Symlink { .. } => NodeKind::Symlink,
        }
    }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn size(&self) -> u64 {
        match &self.data {
            NodeData::File { content } => content.len() as u64,
            NodeData::Directory { .. } => 0,
            NodeData::Symlink { target } => target.len() as u64,
        }
    }

    pub fn children(&self) -> Option<&[NodeId]> {
        match &self.data {
            NodeData::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn symlink_target(&self) -> Option<&str> {
        match &self.data {
            NodeData::Symlink { target } => Some(target),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub(crate) struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    clock: Arc<dyn Clock>,
    last_tick: i64,
    limits: FsLimits,
}

impl Tree {
    pub fn new(clock: Arc<dyn Clock>, limits: FsLimits, owner: Credentials) -> Self {
        let now = clock.now();
        let root = Node {
            name: "/".to_string(),
            data: NodeData::Directory {
                children: Vec::new(),
            },
            mode: 0o755,
            uid: owner.uid,
            gid: owner.gid,
            times: FileTimes::all(now),
            parent: NodeId::ROOT,
        };

        Self {
            slots: vec![Slot {
                generation: NodeId::ROOT.generation,
                node: Some(root),
            }],
            free: Vec::new(),
            clock,
            last_tick: now,
            limits,
        }
    }

    pub fn limits(&self) -> &FsLimits {
        &self.limits
    }

    /// Current time, never earlier than any timestamp handed out before
    fn now(&mut self) -> i64 {
        let now = self.clock.now().max(self.last_tick);
        self.last_tick = now;
        now
    }

    pub fn get(&self, id: NodeId) -> FsResult<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(FsError::NotFound)
    }

    fn get_mut(&mut self, id: NodeId) -> FsResult<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(FsError::NotFound)
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    pub fn attributes(&self, id: NodeId) -> FsResult<Attributes> {
        let node = self.get(id)?;
        Ok(Attributes {
            id,
            kind: node.kind(),
            size: node.size(),
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            times: node.times,
        })
    }

    pub fn validate_name(&self, name: &str) -> FsResult<()> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\0')
            || name.len() > self.limits.max_name_len
        {
            return Err(FsError::InvalidName);
        }
        Ok(())
    }

    pub fn children(&self, dir: NodeId) -> FsResult<&[NodeId]> {
        self.get(dir)?.children().ok_or(FsError::NotADirectory)
    }

    /// Look up `name` among the children of `dir`
    pub fn find_child(&self, dir: NodeId, name: &str) -> FsResult<Option<NodeId>> {
        let children = self.children(dir)?;
        Ok(children
            .iter()
            .copied()
            .find(|child| self.get(*child).map(|n| n.name == name).unwrap_or(false)))
    }

    /// Absolute path of a live node, built from its ancestors' names
    pub fn path_of(&self, id: NodeId) -> FsResult<String> {
        let mut names = Vec::new();
        let mut current = id;
        while current != NodeId::ROOT {
            let node = self.get(current)?;
            names.push(node.name.as_str());
            current = node.parent;
        }
        if names.is_empty() {
            return Ok("/".to_string());
        }
        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name);
        }
        Ok(path)
    }

    /// True if `ancestor` is `id` itself or lies on its parent chain
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == ancestor {
                return true;
            }
            if current == NodeId::ROOT {
                return false;
            }
            match self.get(current) {
                Ok(node) => current = node.parent,
                Err(_) => return false,
            }
        }
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        if id != NodeId::ROOT {
            self.free.push(id.index);
        }
        Some(node)
    }

    /// Insert a new child under `parent`
    pub fn insert(
        &mut self,
        parent: NodeId,
        name: &str,
        data: NodeData,
        mode: u32,
        owner: Credentials,
    ) -> FsResult<NodeId> {
        self.validate_name(name)?;
        let siblings = self.children(parent)?;
        if self.find_child(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        if siblings.len() >= self.limits.max_children {
            return Err(FsError::LimitExceeded);
        }

        let now = self.now();
        let id = self.allocate(Node {
            name: name.to_string(),
            data,
            mode,
            uid: owner.uid,
            gid: owner.gid,
            times: FileTimes::all(now),
            parent,
        });

        let parent_node = self.get_mut(parent)?;
        if let NodeData::Directory { children } = &mut parent_node.data {
            children.push(id);
        }
        parent_node.times.modified = now;
        Ok(id)
    }

    /// Unlink `id` from its parent and release it
    pub fn remove(&mut self, id: NodeId) -> FsResult<Node> {
        if id == NodeId::ROOT {
            return Err(FsError::InvalidArgument);
        }
        let node = self.get(id)?;
        if node.children().is_some_and(|c| !c.is_empty()) {
            return Err(FsError::NotEmpty);
        }
        let parent = node.parent;

        let now = self.now();
        let parent_node = self.get_mut(parent)?;
        if let NodeData::Directory { children } = &mut parent_node.data {
            children.retain(|child| *child != id);
        }
        parent_node.times.modified = now;

        self.release(id).ok_or(FsError::NotFound)
    }

    /// Move `id` under `new_parent` as `new_name`; both links change together
    pub fn relink(&mut self, id: NodeId, new_parent: NodeId, new_name: &str) -> FsResult<()> {
        if id == NodeId::ROOT {
            return Err(FsError::InvalidArgument);
        }
        self.validate_name(new_name)?;
        let node = self.get(id)?;
        let old_parent = node.parent;
        let is_dir = node.kind() == NodeKind::Directory;
        let siblings = self.children(new_parent)?;

        if old_parent == new_parent && node.name == new_name {
            return Ok(());
        }
        if is_dir && self.is_ancestor_or_self(id, new_parent) {
            return Err(FsError::InvalidArgument);
        }
        if self.find_child(new_parent, new_name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        if old_parent != new_parent && siblings.len() >= self.limits.max_children {
            return Err(FsError::LimitExceeded);
        }

        let now = self.now();
        if old_parent != new_parent {
            let old = self.get_mut(old_parent)?;
            if let NodeData::Directory { children } = &mut old.data {
                children.retain(|child| *child != id);
            }
            old.times.modified = now;

            let new = self.get_mut(new_parent)?;
            if let NodeData::Directory { children } = &mut new.data {
                children.push(id);
            }
            new.times.modified = now;
        } else {
            self.get_mut(old_parent)?.times.modified = now;
        }

        let node = self.get_mut(id)?;
        node.name = new_name.to_string();
        node.parent = new_parent;
        node.times.modified = now;
        Ok(())
    }

    /// Reject sizes past `max_file_size` before anything is allocated
    fn checked_file_len(&self, len: u64) -> FsResult<usize> {
        if len > self.limits.max_file_size {
            return Err(FsError::LimitExceeded);
        }
        usize::try_from(len).map_err(|_| FsError::LimitExceeded)
    }

    /// Make room for `len` bytes in the file `id` without changing its content
    fn reserve_content(&mut self, id: NodeId, len: usize) -> FsResult<()> {
        let NodeData::File { content } = &mut self.get_mut(id)?.data else {
            return Err(FsError::NotAFile);
        };
        if len > content.len() {
            content.try_reserve(len - content.len()).map_err(|_| FsError::LimitExceeded)?;
        }
        Ok(())
    }

    pub fn write(&mut self, id: NodeId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let end = offset.checked_add(data.len() as u64).ok_or(FsError::LimitExceeded)?;
        let end = self.checked_file_len(end)?;
        let start = end - data.len();
        self.reserve_content(id, end)?;

        let now = self.now();
        let node = self.get_mut(id)?;
        if let NodeData::File { content } = &mut node.data {
            // resize zero-fills any gap between the old end and `start`
            if end > content.len() {
                content.resize(end, 0);
            }
            content[start..end].copy_from_slice(data);
        }
        node.times.modified = now;
        node.times.accessed = now;
        Ok(data.len())
    }

    pub fn read(&mut self, id: NodeId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let NodeData::File { content } = &self.get(id)?.data else {
            return Err(FsError::NotAFile);
        };
        let len = content.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let count = buf.len().min(content.len() - start);
        buf[..count].copy_from_slice(&content[start..start + count]);

        let now = self.now();
        self.get_mut(id)?.times.accessed = now;
        Ok(count)
    }

    pub fn truncate(&mut self, id: NodeId, new_len: u64) -> FsResult<()> {
        let new_len = self.checked_file_len(new_len)?;
        self.reserve_content(id, new_len)?;

        let now = self.now();
        let node = self.get_mut(id)?;
        if let NodeData::File { content } = &mut node.data {
            content.resize(new_len, 0);
        }
        node.times.modified = now;
        Ok(())
    }

    pub fn set_mode(&mut self, id: NodeId, mode: u32) -> FsResult<()> {
        let now = self.now();
        let node = self.get_mut(id)?;
        node.mode = mode & 0o7777;
        node.times.modified = now;
        Ok(())
    }

    pub fn set_owner(&mut self, id: NodeId, uid: u32, gid: u32) -> FsResult<()> {
        let now = self.now();
        let node = self.get_mut(id)?;
        node.uid = uid;
        node.gid = gid;
        node.times.modified = now;
        Ok(())
    }

    pub fn touch_accessed(&mut self, id: NodeId) -> FsResult<()> {
        let now = self.now();
        self.get_mut(id)?.times.accessed = now;
        Ok(())
    }

    pub fn stats(&self) -> FsStats {
        let mut stats = FsStats::default();
        for node in self.slots.iter().filter_map(|slot| slot.node.as_ref()) {
            stats.nodes += 1;
            match &node.data {
                NodeData::File { content } => {
                    stats.files += 1;
                    stats.content_bytes += content.len() as u64;
                }
                NodeData::Directory { .. } => stats.directories += 1,
                NodeData::Symlink { .. } => stats.symlinks += 1,
            }
        }
        stats
    }

    /// Release `id` and everything below it, children before parents.
    ///
    /// Returns the number of nodes released. The subtree is detached from its
    /// parent first unless it is the root.
    pub fn release_subtree(&mut self, id: NodeId) -> usize {
        let Ok(node) = self.get(id) else {
            return 0;
        };
        if id != NodeId::ROOT {
            let parent = node.parent;
            if let Ok(parent_node) = self.get_mut(parent) {
                if let NodeData::Directory { children } = &mut parent_node.data {
                    children.retain(|child| *child != id);
                }
            }
        }

        let mut released = 0;
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                if self.release(current).is_some() {
                    released += 1;
                }
                continue;
            }
            stack.push((current, true));
            if let Ok(children) = self.children(current) {
                stack.extend(children.iter().map(|child| (*child, false)));
            }
        }
        released
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        let released = self.release_subtree(NodeId::ROOT);
        tracing::trace!(released, "released filesystem tree");
    }
}
