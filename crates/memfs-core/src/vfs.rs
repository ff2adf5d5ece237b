// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem operations API

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "events")]
use std::collections::HashMap;

use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{FsConfig, SecurityPolicy};
use crate::cwd::WorkingDirectory;
use crate::error::{FsError, FsResult};
use crate::permissions;
use crate::resolve::{self, Resolver};
use crate::tree::{NodeData, Tree};
use crate::{Access, Attributes, Credentials, DirEntry, EventKind, FsStats, NodeId, NodeKind};

#[cfg(feature = "events")]
use crate::{EventSink, SubscriptionId};

/// Everything guarded by the filesystem lock
struct FsState {
    tree: Tree,
    cwd: WorkingDirectory,
    caller: Credentials,
}

impl FsState {
    fn start_for(&mut self, path: &str) -> FsResult<NodeId> {
        if resolve::is_absolute(path) {
            Ok(NodeId::ROOT)
        } else {
            self.cwd.base(&self.tree)
        }
    }

    fn lookup(&mut self, policy: &SecurityPolicy, path: &str, follow: bool) -> FsResult<NodeId> {
        if path.is_empty() {
            return Err(FsError::NotFound);
        }
        let base = self.start_for(path)?;
        Resolver::new(&self.tree, policy, self.caller).resolve(base, path, follow)
    }

    fn lookup_parent(&mut self, policy: &SecurityPolicy, path: &str) -> FsResult<(NodeId, String)> {
        let base = self.start_for(path)?;
        Resolver::new(&self.tree, policy, self.caller).resolve_parent(base, path)
    }

    fn require(&self, policy: &SecurityPolicy, id: NodeId, access: Access) -> FsResult<()> {
        let node = self.tree.get(id)?;
        if permissions::allowed(policy, node, self.caller, access) {
            Ok(())
        } else {
            Err(FsError::PermissionDenied)
        }
    }

    /// Path for log and event messages; never fails for live nodes
    fn display_path(&self, id: NodeId) -> String {
        self.tree.path_of(id).unwrap_or_else(|_| format!("<{id}>"))
    }

    fn link_new(
        &mut self,
        policy: &SecurityPolicy,
        parent: NodeId,
        name: &str,
        data: NodeData,
        mode: u32,
    ) -> FsResult<NodeId> {
        self.tree.children(parent)?;
        self.require(policy, parent, Access::Write)?;
        self.require(policy, parent, Access::Execute)?;
        self.tree.insert(parent, name, data, mode, self.caller)
    }

    fn unlink(&mut self, policy: &SecurityPolicy, id: NodeId) -> FsResult<()> {
        if id == NodeId::ROOT {
            return Err(FsError::InvalidArgument);
        }
        let parent = self.tree.get(id)?.parent;
        self.require(policy, parent, Access::Write)?;
        self.tree.remove(id).map(|_| ())
    }

    fn move_to(
        &mut self,
        policy: &SecurityPolicy,
        id: NodeId,
        new_parent: NodeId,
        new_name: &str,
    ) -> FsResult<()> {
        if id == NodeId::ROOT {
            return Err(FsError::InvalidArgument);
        }
        let old_parent = self.tree.get(id)?.parent;
        self.tree.children(new_parent)?;
        self.require(policy, old_parent, Access::Write)?;
        if new_parent != old_parent {
            self.require(policy, new_parent, Access::Write)?;
        }
        self.tree.relink(id, new_parent, new_name)
    }

    fn read_file(
        &mut self,
        policy: &SecurityPolicy,
        id: NodeId,
        offset: u64,
        buf: &mut [u8],
    ) -> FsResult<usize> {
        if self.tree.get(id)?.kind() != NodeKind::File {
            return Err(FsError::NotAFile);
        }
        self.require(policy, id, Access::Read)?;
        self.tree.read(id, offset, buf)
    }

    fn write_file(
        &mut self,
        policy: &SecurityPolicy,
        id: NodeId,
        offset: u64,
        data: &[u8],
    ) -> FsResult<usize> {
        if self.tree.get(id)?.kind() != NodeKind::File {
            return Err(FsError::NotAFile);
        }
        self.require(policy, id, Access::Write)?;
        self.tree.write(id, offset, data)
    }
}

/// In-memory hierarchical filesystem.
///
/// All operations serialise on a single lock that covers the tree and the
/// working directory, so every call observes and leaves a consistent tree.
pub struct MemFs {
    config: FsConfig,
    state: Mutex<FsState>,
    #[cfg(feature = "events")]
    next_subscription_id: Mutex<u64>,
    #[cfg(feature = "events")]
    event_subscriptions: Mutex<HashMap<SubscriptionId, Arc<dyn EventSink>>>,
}

impl MemFs {
    /// Create a filesystem holding only the root directory
    pub fn new(config: FsConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: FsConfig, clock: Arc<dyn Clock>) -> Self {
        let owner = Credentials::new(config.security.default_uid, config.security.default_gid);
        let tree = Tree::new(clock, config.limits.clone(), owner);
        let cwd = WorkingDirectory::new(config.cwd.stale_policy);
        Self {
            state: Mutex::new(FsState {
                tree,
                cwd,
                caller: owner,
            }),
            config,
            #[cfg(feature = "events")]
            next_subscription_id: Mutex::new(1),
            #[cfg(feature = "events")]
            event_subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    fn policy(&self) -> &SecurityPolicy {
        &self.config.security
    }

    fn lock(&self) -> MutexGuard<'_, FsState> {
        // mutations validate before touching the tree, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn creation_mode(&self, mode: u32) -> u32 {
        mode & 0o777 & !self.config.security.umask
    }

    fn tracks_events(&self) -> bool {
        cfg!(feature = "events") && self.config.track_events
    }

    // Creation

    /// Create an empty regular file at `path`
    pub fn create_file(&self, path: &str, mode: u32) -> FsResult<NodeId> {
        self.create_at_path(
            path,
            NodeData::File {
                content: Vec::new(),
            },
            self.creation_mode(mode),
        )
    }

    pub fn create_directory(&self, path: &str, mode: u32) -> FsResult<NodeId> {
        self.create_at_path(
            path,
            NodeData::Directory {
                children: Vec::new(),
            },
            self.creation_mode(mode),
        )
    }

    /// Create a symlink at `path` pointing at `target`.
    ///
    /// The target is stored verbatim and need not exist.
    pub fn create_symlink(&self, path: &str, target: &str) -> FsResult<NodeId> {
        if target.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        self.create_at_path(
            path,
            NodeData::Symlink {
                target: target.to_string(),
            },
            0o777,
        )
    }

    fn create_at_path(&self, path: &str, data: NodeData, mode: u32) -> FsResult<NodeId> {
        let kind = data.kind();
        let mut st = self.lock();
        let (parent, name) = st.lookup_parent(self.policy(), path)?;
        let id = st.link_new(self.policy(), parent, &name, data, mode)?;
        let created = st.display_path(id);
        drop(st);

        debug!(path = %created, %id, %kind, mode = format_args!("{mode:o}"), "created node");
        self.emit_event(EventKind::Created {
            path: created,
            kind,
        });
        Ok(id)
    }

    /// Create `name` directly under the directory `parent`
    pub fn create_child(
        &self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
        mode: u32,
    ) -> FsResult<NodeId> {
        let data = match kind {
            NodeKind::File => NodeData::File {
                content: Vec::new(),
            },
            NodeKind::Directory => NodeData::Directory {
                children: Vec::new(),
            },
            NodeKind::Symlink => return Err(FsError::InvalidArgument),
        };
        self.create_under(parent, name, data, self.creation_mode(mode))
    }

    pub fn create_symlink_at(&self, parent: NodeId, name: &str, target: &str) -> FsResult<NodeId> {
        if target.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        self.create_under(
            parent,
            name,
            NodeData::Symlink {
                target: target.to_string(),
            },
            0o777,
        )
    }

    fn create_under(
        &self,
        parent: NodeId,
        name: &str,
        data: NodeData,
        mode: u32,
    ) -> FsResult<NodeId> {
        let kind = data.kind();
        let mut st = self.lock();
        let id = st.link_new(self.policy(), parent, name, data, mode)?;
        let created = st.display_path(id);
        drop(st);

        debug!(path = %created, %id, %kind, "created node");
        self.emit_event(EventKind::Created {
            path: created,
            kind,
        });
        Ok(id)
    }

    // Removal and renaming

    /// Delete the node named by `path`; a final symlink is removed, not followed
    pub fn delete(&self, path: &str) -> FsResult<()> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, false)?;
        self.delete_locked(st, id)
    }

    pub fn delete_node(&self, id: NodeId) -> FsResult<()> {
        let st = self.lock();
        self.delete_locked(st, id)
    }

    fn delete_locked(&self, mut st: MutexGuard<'_, FsState>, id: NodeId) -> FsResult<()> {
        let removed = st.display_path(id);
        st.unlink(self.policy(), id)?;
        drop(st);

        debug!(path = %removed, %id, "deleted node");
        self.emit_event(EventKind::Removed { path: removed });
        Ok(())
    }

    /// Move `old` to `new`; the node keeps its id, content and attributes
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), old, false)?;
        let (new_parent, new_name) = st.lookup_parent(self.policy(), new)?;
        self.move_locked(st, id, new_parent, &new_name)
    }

    pub fn move_node(&self, id: NodeId, new_parent: NodeId, new_name: &str) -> FsResult<()> {
        let st = self.lock();
        self.move_locked(st, id, new_parent, new_name)
    }

    fn move_locked(
        &self,
        mut st: MutexGuard<'_, FsState>,
        id: NodeId,
        new_parent: NodeId,
        new_name: &str,
    ) -> FsResult<()> {
        let from = st.display_path(id);
        st.move_to(self.policy(), id, new_parent, new_name)?;
        let to = st.display_path(id);
        drop(st);

        if from != to {
            debug!(%from, %to, %id, "renamed node");
            self.emit_event(EventKind::Renamed { from, to });
        }
        Ok(())
    }

    // Content

    /// Write `data` at `offset`, growing the file and zero-filling any gap
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        self.write_locked(st, id, offset, data)
    }

    pub fn write_node(&self, id: NodeId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let st = self.lock();
        self.write_locked(st, id, offset, data)
    }

    fn write_locked(
        &self,
        mut st: MutexGuard<'_, FsState>,
        id: NodeId,
        offset: u64,
        data: &[u8],
    ) -> FsResult<usize> {
        let written = st.write_file(self.policy(), id, offset, data)?;
        let path = self.tracks_events().then(|| st.display_path(id));
        drop(st);

        debug!(%id, offset, written, "wrote file");
        if let Some(path) = path {
            self.emit_event(EventKind::Modified { path });
        }
        Ok(written)
    }

    /// Copy up to `buf.len()` bytes starting at `offset`; 0 at or past the end
    pub fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        st.read_file(self.policy(), id, offset, buf)
    }

    pub fn read_node(&self, id: NodeId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let mut st = self.lock();
        st.read_file(self.policy(), id, offset, buf)
    }

    /// Whole content of the file at `path`
    pub fn read_to_end(&self, path: &str) -> FsResult<Vec<u8>> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        let size = st.tree.get(id)?.size() as usize;
        let mut content = vec![0; size];
        let read = st.read_file(self.policy(), id, 0, &mut content)?;
        content.truncate(read);
        Ok(content)
    }

    pub fn truncate(&self, path: &str, new_len: u64) -> FsResult<()> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        if st.tree.get(id)?.kind() != NodeKind::File {
            return Err(FsError::NotAFile);
        }
        st.require(self.policy(), id, Access::Write)?;
        st.tree.truncate(id, new_len)?;
        let path = st.display_path(id);
        drop(st);

        debug!(%path, new_len, "truncated file");
        self.emit_event(EventKind::Modified { path });
        Ok(())
    }

    /// Copy a regular file's content and mode into a new file at `dst`
    pub fn copy_file(&self, src: &str, dst: &str) -> FsResult<NodeId> {
        let mut st = self.lock();
        let src_id = st.lookup(self.policy(), src, true)?;
        let source = st.tree.get(src_id)?;
        let NodeData::File { content } = &source.data else {
            return Err(FsError::NotAFile);
        };
        let (content, mode) = (content.clone(), source.mode & 0o777);
        st.require(self.policy(), src_id, Access::Read)?;

        let (parent, name) = st.lookup_parent(self.policy(), dst)?;
        let size = content.len();
        let id = st.link_new(self.policy(), parent, &name, NodeData::File { content }, mode)?;
        st.tree.touch_accessed(src_id)?;
        let created = st.display_path(id);
        drop(st);

        debug!(from = src, to = %created, size, "copied file");
        self.emit_event(EventKind::Created {
            path: created,
            kind: NodeKind::File,
        });
        Ok(id)
    }

    // Metadata

    /// Replace the permission bits; only the owner (or root) may do this
    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        let node = st.tree.get(id)?;
        if !self.is_privileged(st.caller) && st.caller.uid != node.uid {
            return Err(FsError::PermissionDenied);
        }
        st.tree.set_mode(id, mode)?;
        let path = st.display_path(id);
        drop(st);

        debug!(%path, mode = format_args!("{:o}", mode & 0o7777), "changed mode");
        self.emit_event(EventKind::Modified { path });
        Ok(())
    }

    /// Change ownership. Only root may give a node away; the owner may move
    /// it into their own group.
    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        let node = st.tree.get(id)?;
        if !self.is_privileged(st.caller) {
            let caller = st.caller;
            let keeps_owner = uid == node.uid && caller.uid == node.uid;
            let group_ok = gid == node.gid || gid == caller.gid;
            if !keeps_owner || !group_ok {
                return Err(FsError::PermissionDenied);
            }
        }
        st.tree.set_owner(id, uid, gid)?;
        let path = st.display_path(id);
        drop(st);

        debug!(%path, uid, gid, "changed owner");
        self.emit_event(EventKind::Modified { path });
        Ok(())
    }

    fn is_privileged(&self, caller: Credentials) -> bool {
        let policy = self.policy();
        !policy.enforce_permissions || (policy.root_bypass && caller.is_root())
    }

    pub fn stat(&self, path: &str) -> FsResult<Attributes> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        st.tree.attributes(id)
    }

    /// Like [`MemFs::stat`] but reports a final symlink itself
    pub fn lstat(&self, path: &str) -> FsResult<Attributes> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, false)?;
        st.tree.attributes(id)
    }

    pub fn stat_node(&self, id: NodeId) -> FsResult<Attributes> {
        self.lock().tree.attributes(id)
    }

    pub fn read_link(&self, path: &str) -> FsResult<String> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, false)?;
        st.tree
            .get(id)?
            .symlink_target()
            .map(str::to_string)
            .ok_or(FsError::InvalidArgument)
    }

    // Directories

    /// Entries of the directory at `path`, in insertion order
    pub fn list_directory(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        st.tree.children(id)?;
        st.require(self.policy(), id, Access::Read)?;

        let entries = st
            .tree
            .children(id)?
            .iter()
            .map(|child| {
                st.tree.get(*child).map(|node| DirEntry {
                    name: node.name.clone(),
                    kind: node.kind(),
                    size: node.size(),
                })
            })
            .collect::<FsResult<Vec<_>>>()?;
        st.tree.touch_accessed(id)?;
        Ok(entries)
    }

    /// Pre-order listing of the subtree at `path`, taken under one lock.
    ///
    /// Directories the caller cannot read are reported but not descended.
    pub fn walk(&self, path: &str) -> FsResult<Vec<(String, Attributes)>> {
        let mut st = self.lock();
        let start = st.lookup(self.policy(), path, true)?;
        if st.tree.get(start)?.kind() == NodeKind::Directory {
            st.require(self.policy(), start, Access::Read)?;
        }

        let mut out = Vec::new();
        let mut stack = vec![(start, st.tree.path_of(start)?)];
        while let Some((id, path)) = stack.pop() {
            let node = st.tree.get(id)?;
            let children = match node.children() {
                Some(children)
                    if permissions::allowed(self.policy(), node, st.caller, Access::Read) =>
                {
                    children
                }
                _ => &[],
            };
            for child in children.iter().rev() {
                let name = &st.tree.get(*child)?.name;
                let child_path = if path == "/" {
                    format!("/{name}")
                } else {
                    format!("{path}/{name}")
                };
                stack.push((*child, child_path));
            }
            out.push((path, st.tree.attributes(id)?));
        }
        Ok(out)
    }

    /// Make `path` the base for relative resolution
    pub fn change_directory(&self, path: &str) -> FsResult<()> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        if st.tree.get(id)?.kind() != NodeKind::Directory {
            return Err(FsError::NotADirectory);
        }
        st.require(self.policy(), id, Access::Execute)?;
        let canonical = st.tree.path_of(id)?;
        debug!(path = %canonical, "changed directory");
        st.cwd.set(id, canonical);
        Ok(())
    }

    pub fn current_directory(&self) -> String {
        let mut st = self.lock();
        let FsState { tree, cwd, .. } = &mut *st;
        cwd.path(tree)
    }

    /// Absolute path of the node `path` resolves to, symlinks expanded
    pub fn canonical_path(&self, path: &str) -> FsResult<String> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        st.tree.path_of(id)
    }

    /// Lexical absolute form of `path`; the tree is not consulted
    pub fn absolute_path(&self, path: &str) -> String {
        resolve::normalize(&self.current_directory(), path)
    }

    // Queries

    pub fn resolve(&self, path: &str) -> FsResult<NodeId> {
        self.lock().lookup(self.policy(), path, true)
    }

    pub fn resolve_no_follow(&self, path: &str) -> FsResult<NodeId> {
        self.lock().lookup(self.policy(), path, false)
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.stat(path).is_ok_and(|a| a.is_dir())
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.stat(path).is_ok_and(|a| a.is_file())
    }

    pub fn is_symlink(&self, path: &str) -> bool {
        self.lstat(path).is_ok_and(|a| a.is_symlink())
    }

    /// Whether the caller would be granted `access` on the node at `path`
    pub fn access(&self, path: &str, access: Access) -> FsResult<bool> {
        let mut st = self.lock();
        let id = st.lookup(self.policy(), path, true)?;
        let node = st.tree.get(id)?;
        Ok(permissions::allowed(self.policy(), node, st.caller, access))
    }

    pub fn credentials(&self) -> Credentials {
        self.lock().caller
    }

    /// Switch the identity used for ownership and permission checks
    pub fn set_credentials(&self, caller: Credentials) {
        debug!(uid = caller.uid, gid = caller.gid, "switched credentials");
        self.lock().caller = caller;
    }

    pub fn stats(&self) -> FsStats {
        self.lock().tree.stats()
    }

    /// Tear down the tree, children before parents; returns the node count released
    pub fn shutdown(self) -> usize {
        let mut state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let released = state.tree.release_subtree(NodeId::ROOT);
        info!(released, "filesystem shut down");
        released
    }

    // Events

    #[cfg(feature = "events")]
    pub fn subscribe_events(&self, cb: Arc<dyn EventSink>) -> FsResult<SubscriptionId> {
        let mut subscriptions =
            self.event_subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next_id =
            self.next_subscription_id.lock().unwrap_or_else(PoisonError::into_inner);
        let subscription_id = SubscriptionId::new(*next_id);
        *next_id += 1;
        subscriptions.insert(subscription_id, cb);
        Ok(subscription_id)
    }

    #[cfg(feature = "events")]
    pub fn unsubscribe_events(&self, sub: SubscriptionId) -> FsResult<()> {
        let mut subscriptions =
            self.event_subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        if subscriptions.remove(&sub).is_none() {
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    #[cfg(feature = "events")]
    fn emit_event(&self, event: EventKind) {
        if !self.tracks_events() {
            return;
        }
        // sinks run without any filesystem lock held and may call back into us
        let sinks: Vec<Arc<dyn EventSink>> = self
            .event_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for sink in sinks {
            sink.on_event(&event);
        }
    }

    #[cfg(not(feature = "events"))]
    fn emit_event(&self, _event: EventKind) {}
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new(FsConfig::default())
    }
}
