//! Runs an [`Explorer`] on its own task.
//!
//! Callers send [`Command`]s and observe state through a `watch` channel of
//! [`Snapshot`]s, republished after every command or event that changes it.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ExplorerError, Result};
use crate::explorer::{Explorer, Snapshot};
use crate::tree::NodeKind;

/// User-level operations accepted by the explorer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(String),
    Toggle(String),
    Refresh,
    StartCreate(NodeKind),
    Rename(String),
    Commit { path: String, name: String },
    Cancel,
    Delete(String),
}

/// Cloneable front end for a running explorer.
#[derive(Debug, Clone)]
pub struct ExplorerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ExplorerHandle {
    /// Start `explorer` on a new task. The task ends once every handle has
    /// been dropped.
    pub fn spawn(explorer: Explorer) -> (Self, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(explorer.snapshot());
        let task = tokio::spawn(run(explorer, command_rx, snapshot_tx));
        (Self { commands, snapshots }, task)
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ExplorerError::ChannelClosed)
    }

    pub fn toggle_directory(&self, path: &str) -> Result<()> {
        self.send(Command::Toggle(path.to_string()))
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait until the published state satisfies `ready`.
    pub async fn wait_for<F>(&mut self, ready: F) -> Result<Snapshot>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        self.snapshots
            .wait_for(ready)
            .await
            .map(|s| (*s).clone())
            .map_err(|_| ExplorerError::ChannelClosed)
    }
}

async fn run(
    mut explorer: Explorer,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Snapshot>,
) {
    explorer.start();
    publish(&explorer, &snapshots);
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut explorer, command),
                None => break,
            },
            Some(event) = explorer.next_event() => explorer.handle_event(event),
        }
        publish(&explorer, &snapshots);
    }
    debug!("explorer task stopped");
}

fn dispatch(explorer: &mut Explorer, command: Command) {
    match command {
        Command::Select(path) => explorer.select(&path),
        Command::Toggle(path) => explorer.toggle_directory(&path),
        Command::Refresh => {
            explorer.refresh();
        }
        Command::StartCreate(kind) => {
            explorer.start_create(kind);
        }
        Command::Rename(path) => {
            explorer.rename(&path);
        }
        Command::Commit { path, name } => explorer.commit_edit(&path, &name),
        Command::Cancel => explorer.cancel_edit(),
        Command::Delete(path) => {
            explorer.delete_node(&path);
        }
    }
}

fn publish(explorer: &Explorer, snapshots: &watch::Sender<Snapshot>) {
    snapshots.send_if_modified(|current| {
        let next = explorer.snapshot();
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}
