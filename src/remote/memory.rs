//! In-memory [`RemoteFs`] used by the explorer tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::error::{ExplorerError, MutationOp, Result};
use crate::remote::{CreateRequest, Entry, RemoteFs};
use crate::tree::path;
use crate::tree::NodeKind;

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, NodeKind>,
    failing_lists: HashSet<String>,
    mutation_error: Option<String>,
    list_calls: Vec<String>,
    held_list: Option<Arc<Gate>>,
    held_mutation: Option<Arc<Gate>>,
}

/// Holds back the response of one request. The server has already applied
/// the request when [`Gate::reached`] resolves; the caller sees the result
/// only after [`Gate::open`].
#[derive(Debug)]
pub struct Gate {
    arrived: Notify,
    release: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            arrived: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    /// Wait until the held request has been served.
    pub async fn reached(&self) {
        self.arrived.notified().await;
    }

    /// Let the held response through.
    pub fn open(&self) {
        self.release.close();
    }

    async fn pass(&self) {
        self.arrived.notify_one();
        // Closed means opened.
        let _ = self.release.acquire().await;
    }
}

/// A server whose whole tree lives in a map of path to kind.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    /// Build from `(path, kind)` pairs; intermediate directories must be listed.
    pub fn with_nodes(nodes: &[(&str, NodeKind)]) -> Self {
        let remote = Self::default();
        {
            let mut state = remote.state.lock().unwrap();
            for (p, kind) in nodes {
                state.nodes.insert(path::normalize(p), *kind);
            }
        }
        remote
    }

    pub fn add(&self, p: &str, kind: NodeKind) {
        self.state.lock().unwrap().nodes.insert(path::normalize(p), kind);
    }

    pub fn remove(&self, p: &str) {
        let target = path::normalize(p);
        self.state
            .lock()
            .unwrap()
            .nodes
            .retain(|k, _| !path::is_within(k, &target));
    }

    pub fn exists(&self, p: &str) -> bool {
        self.state.lock().unwrap().nodes.contains_key(&path::normalize(p))
    }

    /// Make listings of `p` fail until cleared.
    pub fn fail_list(&self, p: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_lists
            .insert(path::normalize(p));
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_lists.clear();
        state.mutation_error = None;
    }

    /// Reject every mutation with `message`.
    pub fn fail_mutations(&self, message: &str) {
        self.state.lock().unwrap().mutation_error = Some(message.to_string());
    }

    /// Every path listed so far, in call order.
    pub fn list_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn list_count(&self) -> usize {
        self.state.lock().unwrap().list_calls.len()
    }

    /// Hold the response of the next listing.
    pub fn hold_next_list(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.state.lock().unwrap().held_list = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the response of the next create, rename or delete.
    pub fn hold_next_mutation(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.state.lock().unwrap().held_mutation = Some(Arc::clone(&gate));
        gate
    }

    fn is_dir(state: &State, p: &str) -> bool {
        path::is_root(p) || state.nodes.get(p) == Some(&NodeKind::Directory)
    }

    fn mutation_error(state: &State, op: MutationOp, p: &str) -> Result<()> {
        match &state.mutation_error {
            Some(message) => Err(mutation_failed(op, p, message)),
            None => Ok(()),
        }
    }
}

/// Request handling proper; the trait impl adds locking and gating.
impl MemoryRemote {
    fn list_now(state: &mut State, dir: &str) -> Result<Vec<Entry>> {
        let dir = path::normalize(dir);
        state.list_calls.push(dir.clone());
        let fetch_failed = |message: &str| ExplorerError::FetchFailed {
            path: dir.clone(),
            message: message.to_string(),
        };
        if state.failing_lists.contains(&dir) {
            return Err(fetch_failed("permission denied"));
        }
        if !path::is_root(&dir) && !state.nodes.contains_key(&dir) {
            return Err(fetch_failed("path does not exist"));
        }
        if !Self::is_dir(state, &dir) {
            return Err(fetch_failed("not a directory"));
        }
        let mut entries: Vec<Entry> = state
            .nodes
            .iter()
            .filter(|(p, _)| path::parent(p).as_deref() == Some(dir.as_str()))
            .map(|(p, kind)| Entry {
                name: path::leaf(p).to_string(),
                kind: *kind,
                path: p.clone(),
                size: if kind.is_dir() { None } else { Some(0) },
                modified: None,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.kind
                .is_dir()
                .cmp(&a.kind.is_dir())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    fn create_now(state: &mut State, request: &CreateRequest) -> Result<()> {
        let target = path::join(&request.parent, &request.name);
        Self::mutation_error(state, MutationOp::Create, &target)?;
        if request.name.is_empty() {
            return Err(mutation_failed(MutationOp::Create, &target, "name is empty"));
        }
        if !Self::is_dir(state, &request.parent) {
            return Err(mutation_failed(MutationOp::Create, &target, "parent missing"));
        }
        if state.nodes.contains_key(&target) {
            return Err(mutation_failed(MutationOp::Create, &target, "already exists"));
        }
        state.nodes.insert(target, request.kind);
        Ok(())
    }

    fn rename_now(state: &mut State, p: &str, new_name: &str) -> Result<()> {
        let from = path::normalize(p);
        Self::mutation_error(state, MutationOp::Rename, &from)?;
        if !state.nodes.contains_key(&from) {
            return Err(mutation_failed(MutationOp::Rename, &from, "not found"));
        }
        let parent = path::parent(&from).unwrap_or_else(|| path::ROOT_PATH.to_string());
        let to = path::join(&parent, new_name);
        if state.nodes.contains_key(&to) {
            return Err(mutation_failed(MutationOp::Rename, &from, "already exists"));
        }
        let moved: Vec<(String, NodeKind)> = state
            .nodes
            .iter()
            .filter(|(k, _)| path::is_within(k, &from))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (old, kind) in moved {
            state.nodes.remove(&old);
            if let Some(new) = path::rebase(&old, &from, &to) {
                state.nodes.insert(new, kind);
            }
        }
        Ok(())
    }

    fn delete_now(state: &mut State, p: &str) -> Result<()> {
        let target = path::normalize(p);
        Self::mutation_error(state, MutationOp::Delete, &target)?;
        if !state.nodes.contains_key(&target) {
            return Err(mutation_failed(MutationOp::Delete, &target, "not found"));
        }
        state.nodes.retain(|k, _| !path::is_within(k, &target));
        Ok(())
    }

    async fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut State) -> Result<()>,
    {
        let (result, gate) = {
            let mut state = self.state.lock().unwrap();
            let result = apply(&mut state);
            (result, state.held_mutation.take())
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }
        result
    }
}

fn mutation_failed(op: MutationOp, p: &str, message: &str) -> ExplorerError {
    ExplorerError::MutationFailed {
        op,
        path: p.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl RemoteFs for MemoryRemote {
    async fn list(&self, dir: &str) -> Result<Vec<Entry>> {
        let (result, gate) = {
            let mut state = self.state.lock().unwrap();
            let result = Self::list_now(&mut state, dir);
            (result, state.held_list.take())
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }
        result
    }

    async fn create(&self, request: &CreateRequest) -> Result<()> {
        self.mutate(|state| Self::create_now(state, request)).await
    }

    async fn rename(&self, p: &str, new_name: &str) -> Result<()> {
        self.mutate(|state| Self::rename_now(state, p, new_name)).await
    }

    async fn delete(&self, p: &str) -> Result<()> {
        self.mutate(|state| Self::delete_now(state, p)).await
    }
}
