use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use remote_explorer::config::{ExplorerConfig, LoggingConfig, ServerConfig, SyncConfig};
use remote_explorer::error::{ExplorerError, MutationOp, Result};
use remote_explorer::explorer::Explorer;
use remote_explorer::handle::ExplorerHandle;
use remote_explorer::logging;
use remote_explorer::remote::HttpRemote;
use remote_explorer::sync::push::WsPushTransport;
use remote_explorer::tree::path;
use remote_explorer::tree::NodeKind;
use remote_explorer::view;

/// Browse and edit a remote workspace file tree.
#[derive(Parser, Debug)]
#[command(name = "rx", version, about)]
struct Cli {
    /// Explicit config file (overrides discovered config files)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the workspace server
    #[arg(long, global = true)]
    server: Option<String>,

    /// WebSocket URL of the change stream
    #[arg(long, global = true)]
    push_url: Option<String>,

    /// Disable the push channel and rely on polling
    #[arg(long, global = true)]
    no_push: bool,

    /// Log filter, e.g. "debug" (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the workspace tree
    Tree {
        /// Expand every directory
        #[arg(long)]
        expand: bool,
    },
    /// Follow the tree, reprinting on every change
    Watch,
    /// Create a directory
    Mkdir { parent: String, name: String },
    /// Create an empty file
    Touch { parent: String, name: String },
    /// Rename a file or directory in place
    Mv { path: String, new_name: String },
    /// Delete a file or directory
    Rm { path: String },
}

impl Cli {
    /// Partial config carrying only the flags that were given.
    fn overrides(&self) -> ExplorerConfig {
        ExplorerConfig {
            server: ServerConfig {
                url: self.server.clone(),
                push_url: self.push_url.clone(),
                ..Default::default()
            },
            sync: SyncConfig {
                push_enabled: self.no_push.then_some(false),
                ..Default::default()
            },
            logging: LoggingConfig {
                level: self.log_level.clone(),
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, skipped) = ExplorerConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    logging::init_logging(config.log_level());
    for skip in &skipped {
        warn!(path = %skip.path.display(), error = %skip.reason, "ignoring unparsable config file");
    }

    let remote = Arc::new(HttpRemote::new(config.server_url(), config.request_timeout())?);
    let mut explorer = Explorer::new(remote, config.sync_settings());
    info!(server = config.server_url(), "connecting");

    match cli.command {
        Cmd::Tree { expand } => {
            explorer.refresh();
            explorer.settle().await;
            check_error(&explorer)?;
            if expand {
                expand_all(&mut explorer).await;
            }
            print!("{}", view::render_tree(&explorer.snapshot()));
        }
        Cmd::Watch => watch(explorer, &config).await?,
        Cmd::Mkdir { parent, name } => {
            create(&mut explorer, &parent, &name, NodeKind::Directory).await?
        }
        Cmd::Touch { parent, name } => {
            create(&mut explorer, &parent, &name, NodeKind::File).await?
        }
        Cmd::Mv { path: target, new_name } => {
            open_dir(&mut explorer, &parent_of(&target)).await?;
            if !explorer.rename(&target) {
                return Err(not_found(MutationOp::Rename, &target));
            }
            explorer.commit_edit(&target, &new_name);
            explorer.settle().await;
            check_edit(&explorer, MutationOp::Rename, &target)?;
            println!("renamed {} -> {}", target, new_name);
        }
        Cmd::Rm { path: target } => {
            open_dir(&mut explorer, &parent_of(&target)).await?;
            if !explorer.delete_node(&target) {
                return Err(not_found(MutationOp::Delete, &target));
            }
            explorer.settle().await;
            check_error(&explorer)?;
            println!("deleted {}", target);
        }
    }
    Ok(())
}

/// Bootstrap, then expand `dir` and each of its ancestors.
async fn open_dir(explorer: &mut Explorer, dir: &str) -> Result<()> {
    explorer.refresh();
    explorer.settle().await;
    check_error(explorer)?;
    let mut chain = Vec::new();
    let mut cursor = Some(path::normalize(dir));
    while let Some(current) = cursor {
        if path::is_root(&current) {
            break;
        }
        cursor = path::parent(&current);
        chain.push(current);
    }
    for current in chain.into_iter().rev() {
        if !explorer.expanded().contains(&current) {
            explorer.toggle_directory(&current);
            explorer.settle().await;
            check_error(explorer)?;
        }
    }
    Ok(())
}

fn parent_of(target: &str) -> String {
    path::parent(&path::normalize(target)).unwrap_or_else(|| path::ROOT_PATH.to_string())
}

async fn expand_all(explorer: &mut Explorer) {
    loop {
        let snapshot = explorer.snapshot();
        let pending: Vec<String> = view::flatten(&snapshot)
            .into_iter()
            .filter(|item| item.kind.is_dir() && !item.is_expanded)
            .map(|item| item.path)
            .collect();
        if pending.is_empty() {
            break;
        }
        for dir in pending {
            explorer.toggle_directory(&dir);
        }
        explorer.settle().await;
        if explorer.error().is_some() {
            // Unreadable directories were rolled back; leave them collapsed.
            break;
        }
    }
}

async fn create(explorer: &mut Explorer, parent: &str, name: &str, kind: NodeKind) -> Result<()> {
    let parent = path::normalize(parent);
    open_dir(explorer, &parent).await?;
    explorer.select(&parent);
    if explorer.selection() != parent {
        return Err(not_found(MutationOp::Create, &parent));
    }
    let Some(provisional) = explorer.start_create(kind) else {
        return Err(not_found(MutationOp::Create, &parent));
    };
    explorer.settle().await;
    explorer.commit_edit(&provisional, name);
    explorer.settle().await;
    check_edit(explorer, MutationOp::Create, &path::join(&parent, name))?;
    println!("created {}", path::join(&parent, name));
    Ok(())
}

async fn watch(explorer: Explorer, config: &ExplorerConfig) -> Result<()> {
    let push = if config.push_enabled() {
        Some(WsPushTransport::spawn(config.push_settings(), explorer.sender()))
    } else {
        None
    };
    let (handle, _task) = ExplorerHandle::spawn(explorer);
    let mut updates = handle.subscribe();
    loop {
        let snapshot = (*updates.borrow_and_update()).clone();
        print!("{}", view::render_tree(&snapshot));
        println!("{}", view::status_line(&snapshot));
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    if let Some(push) = push {
        push.abort();
    }
    Ok(())
}

/// The explorer reports failures as status text; a one-shot command
/// treats any of them as fatal.
fn check_error(explorer: &Explorer) -> Result<()> {
    match explorer.error() {
        Some(message) => Err(ExplorerError::Reported(message.to_string())),
        None => Ok(()),
    }
}

/// A create/rename that was rejected leaves the edit slot open with the
/// server's message.
fn check_edit(explorer: &Explorer, op: MutationOp, target: &str) -> Result<()> {
    match explorer.edit() {
        None => Ok(()),
        Some(slot) => Err(ExplorerError::MutationFailed {
            op,
            path: target.to_string(),
            message: slot
                .error
                .clone()
                .unwrap_or_else(|| "edit did not complete".to_string()),
        }),
    }
}

fn not_found(op: MutationOp, target: &str) -> ExplorerError {
    ExplorerError::MutationFailed {
        op,
        path: target.to_string(),
        message: "no such path".to_string(),
    }
}
