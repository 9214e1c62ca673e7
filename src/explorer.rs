//! The reconciliation engine.
//!
//! `Explorer` owns the mirrored tree, the expansion set, the selection and
//! the edit slot. Public operations update that state synchronously and
//! spawn any network work; completions come back as [`Event`]s and are
//! applied by [`Explorer::handle_event`] on the owning task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ExplorerError;
use crate::event::{Event, PushSignal};
use crate::expansion::ExpansionSet;
use crate::mutation::{self, CommitPlan, EditSlot, EditTarget, MutationTicket};
use crate::remote::{CreateRequest, Entry, RemoteFs};
use crate::sync::refresh::{self, RefreshOutcome};
use crate::sync::{ConnectionState, SyncChannel, SyncSettings};
use crate::tree::ops::{self, find_node};
use crate::tree::path::{self, ROOT_PATH};
use crate::tree::{EditState, NodeKind, TreeNode};

/// Read-only view of the explorer handed to renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tree: TreeNode,
    /// Expanded directories, ancestors first.
    pub expanded: Vec<String>,
    pub selection: String,
    /// A refresh is in flight.
    pub loading: bool,
    pub error: Option<String>,
    pub connected: bool,
    pub connection: ConnectionState,
    pub edit: Option<EditSlot>,
}

impl Snapshot {
    pub fn is_expanded(&self, dir: &str) -> bool {
        self.expanded.iter().any(|p| p == dir)
    }

    pub fn find(&self, target: &str) -> Option<&TreeNode> {
        find_node(&self.tree, &path::normalize(target))
    }
}

/// Network request behind a [`MutationTicket`].
enum MutationRequest {
    Create(CreateRequest),
    Rename { path: String, new_name: String },
    Delete(String),
}

/// Client-side mirror of the remote workspace tree.
pub struct Explorer {
    remote: Arc<dyn RemoteFs>,
    tree: TreeNode,
    expanded: ExpansionSet,
    selection: String,
    edit: Option<EditSlot>,
    next_edit_id: u64,
    sync: SyncChannel,
    error: Option<String>,
    /// Spawned requests whose completion has not been applied yet.
    pending: usize,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Explorer {
    pub fn new(remote: Arc<dyn RemoteFs>, settings: SyncSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            remote,
            tree: TreeNode::root(),
            expanded: ExpansionSet::new(),
            selection: ROOT_PATH.to_string(),
            edit: None,
            next_edit_id: 0,
            sync: SyncChannel::new(settings),
            error: None,
            pending: 0,
            tx,
            rx,
        }
    }

    /// Bootstrap the tree and start fallback polling until the push
    /// channel reports connected.
    pub fn start(&mut self) {
        self.refresh();
        if !self.sync.is_connected() {
            self.sync.start_polling(&self.tx);
        }
    }

    /// Sender for producers outside the explorer, such as the push transport.
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    // ── Read access ──────────────────────────────────────────────────────

    pub fn tree(&self) -> &TreeNode {
        &self.tree
    }

    pub fn expanded(&self) -> &ExpansionSet {
        &self.expanded
    }

    pub fn selection(&self) -> &str {
        &self.selection
    }

    pub fn edit(&self) -> Option<&EditSlot> {
        self.edit.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.sync.is_refreshing()
    }

    pub fn is_connected(&self) -> bool {
        self.sync.is_connected()
    }

    pub fn is_polling(&self) -> bool {
        self.sync.is_polling()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tree: self.tree.clone(),
            expanded: self.expanded.in_refresh_order(),
            selection: self.selection.clone(),
            loading: self.is_loading(),
            error: self.error.clone(),
            connected: self.sync.is_connected(),
            connection: self.sync.connection(),
            edit: self.edit.clone(),
        }
    }

    // ── Selection and expansion ──────────────────────────────────────────

    /// Select a node. Unknown paths are ignored.
    pub fn select(&mut self, target: &str) {
        let target = path::normalize(target);
        if find_node(&self.tree, &target).is_some() {
            self.selection = target;
        }
    }

    /// Expand a collapsed directory or collapse an expanded one.
    ///
    /// Collapsing cascades to every expanded descendant. Expanding fetches
    /// the listing only when the directory is not loaded yet.
    pub fn toggle_directory(&mut self, target: &str) {
        let target = path::normalize(target);
        let Some(node) = find_node(&self.tree, &target) else {
            debug!(path = %target, "toggle on unknown path");
            return;
        };
        let is_dir = node.is_dir();
        self.selection = target.clone();
        if !is_dir {
            return;
        }
        if self.expanded.contains(&target) {
            let removed = self.expanded.collapse(&target);
            debug!(path = %target, removed, "collapsed");
        } else {
            self.expand(&target);
        }
    }

    fn expand(&mut self, dir: &str) {
        self.expanded.insert(dir);
        let needs_fetch = find_node(&self.tree, dir)
            .map(|n| n.is_dir() && !n.loaded && !n.loading)
            .unwrap_or(false);
        if !needs_fetch {
            return;
        }
        self.tree = ops::set_loading(self.take_tree(), dir, true);
        self.spawn_listing(dir.to_string());
    }

    fn spawn_listing(&mut self, dir: String) {
        self.pending += 1;
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = remote.list(&dir).await;
            let _ = tx.send(Event::Listing { path: dir, result });
        });
    }

    // ── Refresh ──────────────────────────────────────────────────────────

    /// Request a full refresh. Returns `false` if the debounce gate
    /// skipped it.
    pub fn refresh(&mut self) -> bool {
        match self.sync.begin_refresh() {
            Some(seq) => {
                self.spawn_refresh(seq);
                true
            }
            None => false,
        }
    }

    fn force_refresh(&mut self) {
        let seq = self.sync.force_refresh();
        self.spawn_refresh(seq);
    }

    fn spawn_refresh(&mut self, seq: u64) {
        self.pending += 1;
        let dirs = self.expanded.in_refresh_order();
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();
        debug!(seq, dirs = dirs.len(), "refresh started");
        tokio::spawn(async move {
            let result = refresh::fetch_all(remote.as_ref(), dirs).await;
            let _ = tx.send(Event::Refreshed { seq, result });
        });
    }

    // ── Edits ────────────────────────────────────────────────────────────

    /// Insert a provisional node in the selected directory and start
    /// editing its name. Returns its synthetic path, or `None` if another
    /// edit is active.
    pub fn start_create(&mut self, kind: NodeKind) -> Option<String> {
        if let Some(slot) = &self.edit {
            debug!(active = %slot.path, "create rejected, edit in progress");
            return None;
        }
        let parent = self.create_target();
        if !self.expanded.contains(&parent) {
            self.expand(&parent);
        }
        let new_path = mutation::provisional_path(find_node(&self.tree, &parent)?, kind);
        self.tree = ops::insert_child(
            self.take_tree(),
            &parent,
            TreeNode::provisional(&new_path, kind),
        );
        let id = self.issue_edit_id();
        self.edit = Some(EditSlot::new_entry(id, &new_path, &parent, kind));
        Some(new_path)
    }

    /// Directory a create lands in: the selection if it is a directory,
    /// otherwise its parent, otherwise the root.
    fn create_target(&self) -> String {
        match find_node(&self.tree, &self.selection) {
            Some(node) if node.is_dir() => node.path.clone(),
            Some(node) => path::parent(&node.path)
                .filter(|p| find_node(&self.tree, p).is_some())
                .unwrap_or_else(|| ROOT_PATH.to_string()),
            None => ROOT_PATH.to_string(),
        }
    }

    /// Put an existing node into rename mode.
    pub fn rename(&mut self, target: &str) -> bool {
        let target = path::normalize(target);
        if self.edit.is_some() || path::is_root(&target) {
            return false;
        }
        let id = self.issue_edit_id();
        let Some(node) = find_node(&self.tree, &target) else {
            return false;
        };
        self.edit = Some(EditSlot::rename(id, node));
        self.tree = ops::set_edit_state(self.take_tree(), &target, EditState::EditingExisting);
        self.selection = target;
        true
    }

    fn issue_edit_id(&mut self) -> u64 {
        self.next_edit_id += 1;
        self.next_edit_id
    }

    /// Commit the typed name for the active edit.
    ///
    /// Ignored unless `target` is the node being edited and no request for
    /// it is already in flight.
    pub fn commit_edit(&mut self, target: &str, new_name: &str) {
        let target = path::normalize(target);
        let (edit, plan) = match self.edit.as_mut() {
            Some(slot) if slot.path == target && !slot.in_flight => {
                slot.draft = new_name.trim().to_string();
                (slot.id, mutation::plan_commit(slot, new_name))
            }
            _ => {
                debug!(path = %target, "commit ignored");
                return;
            }
        };

        match plan {
            CommitPlan::Discard => self.discard_edit(),
            CommitPlan::KeepEditing => debug!(path = %target, "blank name, still editing"),
            CommitPlan::Finish => self.finish_edit(),
            CommitPlan::Invalid(reason) => {
                if let Some(slot) = self.edit.as_mut() {
                    slot.error = Some(reason.clone());
                }
                self.error = Some(reason);
            }
            CommitPlan::Create(request) => {
                let ticket = MutationTicket::Create {
                    edit,
                    created: path::join(&request.parent, &request.name),
                };
                self.mark_in_flight();
                self.spawn_mutation(ticket, MutationRequest::Create(request));
            }
            CommitPlan::Rename { path: from, new_name } => {
                let parent = path::parent(&from).unwrap_or_else(|| ROOT_PATH.to_string());
                let ticket = MutationTicket::Rename {
                    edit,
                    from: from.clone(),
                    to: path::join(&parent, &new_name),
                };
                self.mark_in_flight();
                self.spawn_mutation(ticket, MutationRequest::Rename { path: from, new_name });
            }
        }
    }

    /// Abandon the active edit: provisional nodes disappear, existing
    /// nodes keep their current name.
    pub fn cancel_edit(&mut self) {
        let Some(slot) = &self.edit else {
            return;
        };
        if slot.in_flight {
            debug!(path = %slot.path, "cancel ignored, request in flight");
            return;
        }
        if slot.is_provisional() {
            self.discard_edit();
        } else {
            self.finish_edit();
        }
    }

    /// Delete a node on the server. The caller has already confirmed.
    pub fn delete_node(&mut self, target: &str) -> bool {
        let target = path::normalize(target);
        if path::is_root(&target) {
            warn!("refusing to delete the workspace root");
            return false;
        }
        if find_node(&self.tree, &target).is_none() {
            return false;
        }
        let ticket = MutationTicket::Delete {
            path: target.clone(),
        };
        self.spawn_mutation(ticket, MutationRequest::Delete(target));
        true
    }

    fn mark_in_flight(&mut self) {
        if let Some(slot) = self.edit.as_mut() {
            slot.in_flight = true;
            slot.error = None;
        }
    }

    fn discard_edit(&mut self) {
        if let Some(slot) = self.edit.take() {
            self.tree = ops::remove_node(self.take_tree(), &slot.path);
        }
    }

    fn finish_edit(&mut self) {
        if let Some(slot) = self.edit.take() {
            self.tree = ops::set_edit_state(self.take_tree(), &slot.path, EditState::None);
        }
    }

    fn spawn_mutation(&mut self, ticket: MutationTicket, request: MutationRequest) {
        self.pending += 1;
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match request {
                MutationRequest::Create(req) => remote.create(&req).await,
                MutationRequest::Rename { path, new_name } => remote.rename(&path, &new_name).await,
                MutationRequest::Delete(path) => remote.delete(&path).await,
            };
            let _ = tx.send(Event::Mutated { ticket, result });
        });
    }

    // ── Event loop ───────────────────────────────────────────────────────

    /// Wait for the next event. The explorer holds a sender itself, so
    /// this only returns `None` if the runtime is shutting down.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Wait for and apply one event.
    pub async fn process_next(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply events until every spawned request has completed.
    pub async fn settle(&mut self) {
        while self.pending > 0 {
            if !self.process_next().await {
                break;
            }
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Listing { path, result } => {
                self.complete_request();
                self.apply_listing(path, result);
            }
            Event::Refreshed { seq, result } => {
                self.complete_request();
                self.apply_refresh(seq, result);
            }
            Event::Mutated { ticket, result } => {
                self.complete_request();
                self.apply_mutation(ticket, result);
            }
            Event::Push(signal) => self.handle_push(signal),
            Event::CoalesceElapsed => {
                self.sync.coalesce_elapsed();
                self.refresh();
            }
            Event::PollTick => {
                if !self.sync.is_connected() {
                    self.refresh();
                }
            }
        }
    }

    fn complete_request(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    fn apply_listing(&mut self, dir: String, result: Result<Vec<Entry>, ExplorerError>) {
        match result {
            Ok(entries) => {
                let children = entries
                    .iter()
                    .map(|e| TreeNode::from_entry(e, &dir))
                    .collect();
                self.tree = ops::replace_children(self.take_tree(), &dir, children);
                self.restore_edit();
                debug!(path = %dir, "directory loaded");
            }
            Err(e) => {
                warn!(path = %dir, error = %e, "expand failed");
                self.expanded.remove(&dir);
                self.tree = ops::set_loading(self.take_tree(), &dir, false);
                self.error = Some(e.to_string());
                let orphaned = matches!(
                    self.edit.as_ref().map(|s| &s.target),
                    Some(EditTarget::New { parent, .. }) if *parent == dir
                );
                if orphaned {
                    self.discard_edit();
                }
            }
        }
    }

    fn apply_refresh(&mut self, seq: u64, result: Result<RefreshOutcome, ExplorerError>) {
        if !self.sync.finish_refresh(seq) {
            return;
        }
        match result {
            Ok(outcome) => {
                self.tree = refresh::reconcile(self.take_tree(), &outcome.contents, &self.expanded);
                self.after_reconcile();
                self.error = None;
                debug!(seq, "refresh applied");
            }
            Err(e) => {
                warn!(seq, error = %e, "refresh failed");
                self.error = Some(e.to_string());
            }
        }
    }

    /// Restore invariants that a wholesale tree update can break.
    fn after_reconcile(&mut self) {
        self.follow_pending_rename();
        let tree = &self.tree;
        self.expanded.retain(|p| still_expandable(tree, p));
        self.restore_edit();
        if find_node(&self.tree, &self.selection).is_none() {
            debug!(path = %self.selection, "selection vanished, resetting to root");
            self.selection = ROOT_PATH.to_string();
        }
    }

    /// A refresh can observe a rename before its confirmation arrives. Move
    /// expansion, selection and the edit along with it so nothing under
    /// the old path is pruned.
    fn follow_pending_rename(&mut self) {
        let Some((from, to)) = self.edit.as_ref().and_then(|s| s.rename_in_flight()) else {
            return;
        };
        if find_node(&self.tree, &from).is_some() || find_node(&self.tree, &to).is_none() {
            return;
        }
        debug!(from = %from, to = %to, "rename observed before confirmation");
        self.move_renamed(&from, &to);
        if let Some(slot) = self.edit.as_mut() {
            slot.path = to;
        }
    }

    fn move_renamed(&mut self, from: &str, to: &str) {
        if let Some(moved) = path::rebase(&self.selection, from, to) {
            self.selection = moved;
        }
        self.expanded.rebase(from, to);
    }

    /// Re-apply the active edit after children were replaced.
    fn restore_edit(&mut self) {
        let Some(slot) = self.edit.clone() else {
            return;
        };
        match &slot.target {
            EditTarget::New { parent, kind } => {
                match find_node(&self.tree, &slot.path) {
                    Some(node) if node.is_provisional() => return,
                    // Most likely the node this edit is creating; the
                    // confirmation settles it.
                    Some(_) if slot.in_flight => return,
                    _ => {}
                }
                let Some(parent_node) = find_node(&self.tree, parent).filter(|n| n.is_dir())
                else {
                    debug!(path = %slot.path, "provisional parent vanished, dropping edit");
                    self.edit = None;
                    return;
                };
                // A real node may have taken the synthetic path meanwhile.
                let new_path = if find_node(&self.tree, &slot.path).is_some() {
                    mutation::provisional_path(parent_node, *kind)
                } else {
                    slot.path.clone()
                };
                let node = TreeNode::provisional(&new_path, *kind);
                self.tree = ops::insert_child(self.take_tree(), parent, node);
                if let Some(active) = self.edit.as_mut() {
                    active.path = new_path;
                }
            }
            EditTarget::Existing { .. } => {
                if find_node(&self.tree, &slot.path).is_some() {
                    self.tree = ops::set_edit_state(
                        self.take_tree(),
                        &slot.path,
                        EditState::EditingExisting,
                    );
                } else {
                    debug!(path = %slot.path, "renamed node vanished, dropping edit");
                    self.edit = None;
                }
            }
        }
    }

    fn apply_mutation(&mut self, ticket: MutationTicket, result: Result<(), ExplorerError>) {
        match (ticket, result) {
            (MutationTicket::Create { edit, created }, Ok(())) => {
                info!(path = %created, "created");
                if let Some(slot) = self.take_edit(edit) {
                    let provisional =
                        find_node(&self.tree, &slot.path).is_some_and(|n| n.is_provisional());
                    if provisional {
                        self.tree = ops::remove_node(self.take_tree(), &slot.path);
                    }
                }
                self.selection = created;
                self.force_refresh();
            }
            (MutationTicket::Rename { edit, from, to }, Ok(())) => {
                info!(from = %from, to = %to, "renamed");
                if let Some(slot) = self.take_edit(edit) {
                    self.tree = ops::set_edit_state(self.take_tree(), &slot.path, EditState::None);
                }
                self.tree = ops::set_edit_state(self.take_tree(), &from, EditState::None);
                self.move_renamed(&from, &to);
                self.force_refresh();
            }
            (MutationTicket::Delete { path: deleted }, Ok(())) => {
                info!(path = %deleted, "deleted");
                self.expanded.collapse(&deleted);
                if path::is_within(&self.selection, &deleted) {
                    self.selection = ROOT_PATH.to_string();
                }
                self.force_refresh();
            }
            (MutationTicket::Create { edit, created }, Err(e)) => self.fail_edit(edit, &created, e),
            (MutationTicket::Rename { edit, from, .. }, Err(e)) => self.fail_edit(edit, &from, e),
            (MutationTicket::Delete { path: target }, Err(e)) => {
                warn!(path = %target, error = %e, "delete rejected");
                self.error = Some(e.to_string());
            }
        }
    }

    /// Hand a rejected create/rename back to the edit so it can be retried.
    fn fail_edit(&mut self, edit: u64, target: &str, e: ExplorerError) {
        warn!(path = %target, error = %e, "mutation rejected");
        if let Some(slot) = self.edit.as_mut().filter(|s| s.id == edit) {
            slot.in_flight = false;
            slot.error = Some(e.status_message());
        }
        self.error = Some(e.to_string());
        // A refresh may have skipped the provisional node while in flight.
        self.restore_edit();
    }

    /// Close the active edit if it is the one `edit` identifies.
    fn take_edit(&mut self, edit: u64) -> Option<EditSlot> {
        if self.edit.as_ref().is_some_and(|s| s.id == edit) {
            self.edit.take()
        } else {
            None
        }
    }

    fn handle_push(&mut self, signal: PushSignal) {
        match signal {
            PushSignal::Connecting => self.sync.set_connection(ConnectionState::Connecting),
            PushSignal::Connected => {
                info!("live updates enabled");
                self.sync.set_connection(ConnectionState::Connected);
                self.sync.stop_polling();
                self.error = None;
            }
            PushSignal::Disconnected => {
                info!("live updates lost, polling");
                self.sync.set_connection(ConnectionState::Disconnected);
                self.sync.start_polling(&self.tx);
            }
            PushSignal::ConnectError(message) => {
                let err = ExplorerError::TransportDown(message);
                warn!(error = %err, "falling back to polling");
                self.sync.set_connection(ConnectionState::Disconnected);
                self.sync.start_polling(&self.tx);
            }
            PushSignal::Change(change) => {
                debug!(kind = ?change.kind, path = %change.path, "server change");
                if !self.sync.schedule_coalesced(&self.tx) {
                    debug!("change coalesced into pending refresh");
                }
            }
        }
    }

    fn take_tree(&mut self) -> TreeNode {
        std::mem::take(&mut self.tree)
    }
}

/// An expanded path stays expanded while it names a directory, or while
/// its nearest known ancestor has not been listed yet.
fn still_expandable(tree: &TreeNode, dir: &str) -> bool {
    if path::is_root(dir) {
        return true;
    }
    if let Some(node) = find_node(tree, dir) {
        return node.is_dir();
    }
    let mut cursor = path::parent(dir);
    while let Some(ancestor) = cursor {
        if let Some(node) = find_node(tree, &ancestor) {
            return node.is_dir() && !node.loaded;
        }
        cursor = path::parent(&ancestor);
    }
    false
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::remote::memory::MemoryRemote;
    use crate::remote::{ChangeEvent, ChangeKind};

    fn workspace() -> Arc<MemoryRemote> {
        Arc::new(MemoryRemote::with_nodes(&[
            ("docs", NodeKind::Directory),
            ("docs/old.txt", NodeKind::File),
            ("docs/guide.md", NodeKind::File),
            ("src", NodeKind::Directory),
            ("src/main.rs", NodeKind::File),
            ("src/utils", NodeKind::Directory),
            ("src/utils/fmt.rs", NodeKind::File),
            ("private", NodeKind::Directory),
            ("README.md", NodeKind::File),
        ]))
    }

    async fn bootstrapped(remote: &Arc<MemoryRemote>) -> Explorer {
        let mut explorer = Explorer::new(remote.clone(), SyncSettings::default());
        assert!(explorer.refresh());
        explorer.settle().await;
        explorer
    }

    fn node<'a>(explorer: &'a Explorer, p: &str) -> Option<&'a TreeNode> {
        find_node(explorer.tree(), p)
    }

    fn assert_single_edit(explorer: &Explorer) {
        assert!(ops::editing_paths(explorer.tree()).len() <= 1);
    }

    #[tokio::test]
    async fn bootstrap_loads_root() {
        let remote = workspace();
        let explorer = bootstrapped(&remote).await;
        assert!(explorer.tree().loaded);
        let names: Vec<&str> = explorer.tree().children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "private", "src", "README.md"]);
        assert!(!node(&explorer, "src").unwrap().loaded);
        assert!(!explorer.is_loading());
    }

    #[tokio::test]
    async fn nested_expand_then_collapse_cascades() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;

        explorer.toggle_directory("/src");
        assert!(node(&explorer, "src").unwrap().loading);
        explorer.settle().await;
        explorer.toggle_directory("/src/utils");
        explorer.settle().await;

        assert!(explorer.expanded().contains("src"));
        assert!(explorer.expanded().contains("src/utils"));
        assert!(node(&explorer, "src").unwrap().loaded);
        assert!(node(&explorer, "src/utils").unwrap().loaded);
        assert!(node(&explorer, "src/utils/fmt.rs").is_some());
        assert_eq!(explorer.selection(), "src/utils");

        explorer.toggle_directory("/src");
        assert!(!explorer.expanded().contains("src"));
        assert!(!explorer.expanded().contains("src/utils"));
        assert_eq!(explorer.selection(), "src");
    }

    #[tokio::test]
    async fn re_expanding_loaded_directory_does_not_fetch() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("docs");
        explorer.settle().await;
        let calls = remote.list_count();

        explorer.toggle_directory("docs");
        explorer.toggle_directory("docs");
        explorer.settle().await;
        assert_eq!(remote.list_count(), calls);
        assert!(explorer.expanded().contains("docs"));
    }

    #[tokio::test]
    async fn failed_expand_rolls_back() {
        let remote = workspace();
        remote.fail_list("private");
        let mut explorer = bootstrapped(&remote).await;

        explorer.toggle_directory("/private");
        assert!(explorer.expanded().contains("private"));
        explorer.settle().await;

        assert!(!explorer.expanded().contains("private"));
        let private = node(&explorer, "private").unwrap();
        assert!(!private.loading);
        assert!(!private.loaded);
        assert!(explorer.error().unwrap().contains("permission denied"));
    }

    #[tokio::test]
    async fn toggling_a_file_only_selects_it() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        let calls = remote.list_count();
        explorer.toggle_directory("README.md");
        assert_eq!(explorer.selection(), "README.md");
        assert!(!explorer.expanded().contains("README.md"));
        assert_eq!(remote.list_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_inside_debounce_fetches_once() {
        let remote = workspace();
        let mut explorer = Explorer::new(remote.clone(), SyncSettings::default());
        assert!(explorer.refresh());
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(!explorer.refresh());
        explorer.settle().await;
        assert_eq!(remote.list_calls(), vec!["/"]);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(explorer.refresh());
        explorer.settle().await;
        assert_eq!(remote.list_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_preserves_expanded_subtrees() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("src");
        explorer.settle().await;
        explorer.toggle_directory("src/utils");
        explorer.settle().await;

        remote.add("src/utils/extra.rs", NodeKind::File);
        remote.add("notes.txt", NodeKind::File);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(explorer.refresh());
        explorer.settle().await;

        assert!(explorer.expanded().contains("src/utils"));
        assert!(node(&explorer, "src/utils/extra.rs").is_some());
        assert!(node(&explorer, "notes.txt").is_some());
        assert!(node(&explorer, "src/utils").unwrap().loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_of_one_directory_keeps_its_children() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("docs");
        explorer.settle().await;

        remote.fail_list("docs");
        remote.add("root.txt", NodeKind::File);
        tokio::time::advance(Duration::from_secs(2)).await;
        explorer.refresh();
        explorer.settle().await;

        assert!(node(&explorer, "root.txt").is_some());
        assert!(node(&explorer, "docs/old.txt").is_some());
        assert!(explorer.expanded().contains("docs"));
        assert!(explorer.error().is_none());
    }

    #[tokio::test]
    async fn start_create_then_blank_commit_restores_tree() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("/docs");
        explorer.settle().await;
        let before = explorer.tree().clone();

        let provisional = explorer.start_create(NodeKind::File).unwrap();
        assert_eq!(provisional, "docs/new_file");
        let created = node(&explorer, "docs/new_file").unwrap();
        assert_eq!(created.edit_state, EditState::EditingNew);
        assert_single_edit(&explorer);

        explorer.commit_edit(&provisional, "");
        assert!(explorer.edit().is_none());
        assert_eq!(explorer.tree(), &before);
    }

    #[tokio::test]
    async fn start_create_while_editing_is_noop() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        assert!(explorer.rename("README.md"));
        let before = explorer.tree().clone();
        assert!(explorer.start_create(NodeKind::File).is_none());
        assert!(!explorer.rename("docs"));
        assert_eq!(explorer.tree(), &before);
        assert_single_edit(&explorer);
    }

    #[tokio::test]
    async fn committed_create_is_replaced_by_server_node() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("docs");
        explorer.settle().await;

        let provisional = explorer.start_create(NodeKind::File).unwrap();
        explorer.commit_edit(&provisional, "readme.md");
        assert!(explorer.edit().unwrap().in_flight);
        explorer.settle().await;

        assert!(remote.exists("docs/readme.md"));
        let created = node(&explorer, "docs/readme.md").unwrap();
        assert_eq!(created.edit_state, EditState::None);
        assert_eq!(created.name, "readme.md");
        assert!(node(&explorer, "docs/new_file").is_none());
        assert!(explorer.edit().is_none());
        assert_eq!(explorer.selection(), "docs/readme.md");
    }

    #[tokio::test]
    async fn create_in_unexpanded_directory_expands_it() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.select("src");
        let provisional = explorer.start_create(NodeKind::Directory).unwrap();
        assert_eq!(provisional, "src/new_folder");
        explorer.settle().await;

        assert!(explorer.expanded().contains("src"));
        assert!(node(&explorer, "src/main.rs").is_some());
        assert!(node(&explorer, "src/new_folder").unwrap().is_provisional());
    }

    #[tokio::test]
    async fn create_under_selected_file_uses_its_parent() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("docs");
        explorer.settle().await;
        explorer.select("docs/guide.md");
        assert_eq!(explorer.start_create(NodeKind::File).as_deref(), Some("docs/new_file"));
    }

    #[tokio::test]
    async fn rejected_create_keeps_provisional_for_retry() {
        let remote = workspace();
        remote.fail_mutations("disk full");
        let mut explorer = bootstrapped(&remote).await;

        let provisional = explorer.start_create(NodeKind::File).unwrap();
        explorer.commit_edit(&provisional, "notes.txt");
        explorer.settle().await;

        let slot = explorer.edit().unwrap();
        assert!(!slot.in_flight);
        assert_eq!(slot.draft, "notes.txt");
        assert_eq!(slot.error.as_deref(), Some("disk full"));
        assert!(node(&explorer, &provisional).unwrap().is_provisional());
        assert!(explorer.error().unwrap().contains("disk full"));

        remote.clear_failures();
        explorer.commit_edit(&provisional, "notes.txt");
        explorer.settle().await;
        assert!(node(&explorer, "notes.txt").is_some());
        assert!(explorer.edit().is_none());
    }

    #[tokio::test]
    async fn blank_rename_keeps_editing() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        assert!(explorer.rename("README.md"));
        explorer.commit_edit("README.md", "   ");
        explorer.settle().await;
        assert_eq!(
            node(&explorer, "README.md").unwrap().edit_state,
            EditState::EditingExisting
        );
        assert!(explorer.edit().is_some());
        assert!(remote.exists("README.md"));
    }

    #[tokio::test]
    async fn unchanged_rename_leaves_edit_mode_without_request() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.rename("README.md");
        let calls = remote.list_count();
        explorer.commit_edit("README.md", "README.md");
        explorer.settle().await;
        assert!(explorer.edit().is_none());
        assert_eq!(node(&explorer, "README.md").unwrap().edit_state, EditState::None);
        assert_eq!(remote.list_count(), calls);
    }

    #[tokio::test]
    async fn rename_moves_selection_and_expansion() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("src");
        explorer.settle().await;
        explorer.toggle_directory("src/utils");
        explorer.settle().await;

        assert!(explorer.rename("src"));
        explorer.commit_edit("src", "lib");
        explorer.settle().await;

        assert!(remote.exists("lib/utils/fmt.rs"));
        assert_eq!(explorer.selection(), "lib");
        assert!(explorer.expanded().contains("lib"));
        assert!(explorer.expanded().contains("lib/utils"));
        assert!(node(&explorer, "lib/utils/fmt.rs").is_some());
        assert!(node(&explorer, "src").is_none());
    }

    #[tokio::test]
    async fn rejected_rename_keeps_name_and_draft() {
        let remote = workspace();
        remote.fail_mutations("name taken");
        let mut explorer = bootstrapped(&remote).await;
        explorer.rename("README.md");
        explorer.commit_edit("README.md", "INTRO.md");
        explorer.settle().await;

        assert_eq!(node(&explorer, "README.md").unwrap().name, "README.md");
        let slot = explorer.edit().unwrap();
        assert_eq!(slot.draft, "INTRO.md");
        assert_eq!(slot.error.as_deref(), Some("name taken"));
    }

    #[tokio::test]
    async fn cancel_discards_provisional_and_reverts_rename() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        let before = explorer.tree().clone();

        explorer.start_create(NodeKind::File);
        explorer.cancel_edit();
        assert_eq!(explorer.tree(), &before);

        explorer.rename("README.md");
        explorer.cancel_edit();
        assert_eq!(explorer.tree(), &before);
        assert!(explorer.edit().is_none());
    }

    #[tokio::test]
    async fn root_cannot_be_renamed_or_deleted() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        assert!(!explorer.rename("/"));
        assert!(!explorer.delete_node("/"));
        assert_eq!(explorer.tree().edit_state, EditState::None);
    }

    #[tokio::test]
    async fn delete_selected_resets_selection() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("docs");
        explorer.settle().await;
        explorer.select("docs/old.txt");

        assert!(explorer.delete_node("docs/old.txt"));
        explorer.settle().await;
        assert!(node(&explorer, "docs/old.txt").is_none());
        assert_eq!(explorer.selection(), ROOT_PATH);
    }

    #[tokio::test]
    async fn delete_directory_drops_expanded_descendants() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("src");
        explorer.settle().await;
        explorer.toggle_directory("src/utils");
        explorer.settle().await;

        explorer.delete_node("src");
        explorer.settle().await;
        assert!(!explorer.expanded().contains("src"));
        assert!(!explorer.expanded().contains("src/utils"));
        assert!(node(&explorer, "src").is_none());
        assert_eq!(explorer.selection(), ROOT_PATH);
    }

    #[tokio::test]
    async fn rejected_delete_leaves_tree_unchanged() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        remote.fail_mutations("locked");
        let before = explorer.tree().clone();
        explorer.delete_node("README.md");
        explorer.settle().await;
        assert_eq!(explorer.tree(), &before);
        assert!(explorer.error().unwrap().contains("locked"));
    }

    #[tokio::test(start_paused = true)]
    async fn push_burst_coalesces_into_one_refresh() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("docs");
        explorer.settle().await;
        explorer.select("docs/old.txt");
        explorer.handle_event(Event::Push(PushSignal::Connected));
        tokio::time::advance(Duration::from_secs(2)).await;

        remote.remove("docs/old.txt");
        let calls = remote.list_count();
        for _ in 0..5 {
            explorer.handle_event(Event::Push(PushSignal::Change(ChangeEvent {
                kind: ChangeKind::Deleted,
                path: "docs/old.txt".into(),
                dest_path: None,
                timestamp: 0.0,
            })));
        }
        // Nothing is fetched until the coalescing window closes.
        assert_eq!(remote.list_count(), calls);

        let event = explorer.next_event().await.unwrap();
        assert!(matches!(event, Event::CoalesceElapsed));
        explorer.handle_event(event);
        explorer.settle().await;

        // One refresh: root plus docs.
        assert_eq!(remote.list_count(), calls + 2);
        assert!(node(&explorer, "docs/old.txt").is_none());
        assert_eq!(explorer.selection(), ROOT_PATH);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_runs_only_while_disconnected() {
        let remote = workspace();
        let mut explorer = Explorer::new(remote.clone(), SyncSettings::default());
        explorer.start();
        explorer.settle().await;
        assert!(explorer.is_polling());
        let calls = remote.list_count();

        let event = explorer.next_event().await.unwrap();
        assert!(matches!(event, Event::PollTick));
        explorer.handle_event(event);
        explorer.settle().await;
        assert_eq!(remote.list_count(), calls + 1);

        explorer.handle_event(Event::Push(PushSignal::Connecting));
        explorer.handle_event(Event::Push(PushSignal::Connected));
        assert!(explorer.is_connected());
        assert!(!explorer.is_polling());

        explorer.handle_event(Event::Push(PushSignal::Disconnected));
        assert!(!explorer.is_connected());
        assert!(explorer.is_polling());
    }

    #[tokio::test]
    async fn connect_error_is_not_a_user_facing_error() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.handle_event(Event::Push(PushSignal::ConnectError("refused".into())));
        assert!(explorer.error().is_none());
        assert!(explorer.is_polling());
        assert_eq!(explorer.snapshot().connection, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn provisional_node_survives_refresh() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        let provisional = explorer.start_create(NodeKind::File).unwrap();

        remote.add("new_file", NodeKind::File);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(explorer.refresh());
        explorer.settle().await;

        let slot = explorer.edit().unwrap();
        assert_eq!(slot.path, "new_file_1");
        assert_ne!(slot.path, provisional);
        assert!(node(&explorer, "new_file").unwrap().edit_state == EditState::None);
        assert!(node(&explorer, "new_file_1").unwrap().is_provisional());
        assert_single_edit(&explorer);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_listing_the_created_node_before_confirmation() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        let provisional = explorer.start_create(NodeKind::File).unwrap();
        assert_eq!(provisional, "new_file");

        let gate = remote.hold_next_mutation();
        explorer.commit_edit(&provisional, "new_file");
        gate.reached().await;
        assert!(remote.exists("new_file"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(explorer.refresh());
        explorer.process_next().await;

        let slot = explorer.edit().unwrap();
        assert_eq!(slot.path, "new_file");
        assert!(slot.in_flight);
        assert!(!node(&explorer, "new_file").unwrap().is_provisional());
        assert!(node(&explorer, "new_file_1").is_none());
        assert_single_edit(&explorer);

        gate.open();
        explorer.settle().await;

        assert!(explorer.edit().is_none());
        let created = node(&explorer, "new_file").unwrap();
        assert_eq!(created.edit_state, EditState::None);
        assert!(node(&explorer, "new_file_1").is_none());
        assert_eq!(explorer.selection(), "new_file");
        assert!(explorer.start_create(NodeKind::File).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_seeing_rename_before_confirmation_keeps_expansion() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;
        explorer.toggle_directory("src");
        explorer.settle().await;
        explorer.toggle_directory("src/utils");
        explorer.settle().await;

        assert!(explorer.rename("src"));
        let gate = remote.hold_next_mutation();
        explorer.commit_edit("src", "lib");
        gate.reached().await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(explorer.refresh());
        explorer.process_next().await;

        assert!(node(&explorer, "src").is_none());
        assert_eq!(explorer.selection(), "lib");
        assert!(explorer.expanded().contains("lib"));
        assert!(explorer.expanded().contains("lib/utils"));
        assert_eq!(explorer.edit().unwrap().path, "lib");

        gate.open();
        explorer.settle().await;

        assert!(explorer.edit().is_none());
        assert_eq!(explorer.selection(), "lib");
        assert!(explorer.expanded().contains("lib/utils"));
        assert!(node(&explorer, "lib/utils/fmt.rs").is_some());
        assert_eq!(node(&explorer, "lib").unwrap().edit_state, EditState::None);
        assert_single_edit(&explorer);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_refresh_is_dropped() {
        let remote = workspace();
        let mut explorer = bootstrapped(&remote).await;

        let gate = remote.hold_next_list();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(explorer.refresh());
        // The first refresh has read the root before notes.txt exists.
        gate.reached().await;
        remote.add("notes.txt", NodeKind::File);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(explorer.refresh());
        explorer.process_next().await;
        assert!(node(&explorer, "notes.txt").is_some());
        assert!(explorer.is_loading());

        gate.open();
        explorer.settle().await;
        assert!(node(&explorer, "notes.txt").is_some());
        assert_eq!(explorer.tree().children.len(), 5);
        assert!(!explorer.is_loading());
    }
}
