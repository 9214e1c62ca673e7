//! Explorer configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--server`, `--push-url`, `--no-push`, `--log-level`)
//! 2. `--config <path>`
//! 3. `$RX_CONFIG` environment variable (path to config file)
//! 4. Project-local `.rx.toml` in the current working directory
//! 5. Global `~/.config/remote-explorer/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::sync::push::{
    PushSettings, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MAX_MS,
    DEFAULT_RECONNECT_DELAY_MS,
};
use crate::sync::refresh::DEFAULT_DEBOUNCE_MS;
use crate::sync::{SyncSettings, DEFAULT_COALESCE_MS, DEFAULT_POLL_INTERVAL_MS};

// ── Section configs ──────────────────────────────────────────────────────────

/// Where the workspace server lives.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the HTTP file API.
    pub url: Option<String>,
    /// WebSocket URL of the change stream. Derived from `url` when unset.
    pub push_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

/// Refresh timing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between user/poll-triggered refreshes.
    pub debounce_ms: Option<u64>,
    /// Window for merging a burst of push changes.
    pub coalesce_ms: Option<u64>,
    /// Fallback polling period while the push channel is down.
    pub poll_interval_ms: Option<u64>,
    pub push_enabled: Option<bool>,
}

/// Push channel reconnection.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PushConfig {
    pub reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub reconnect_delay_max_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. "info" or "remote_explorer=debug".
    pub level: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ExplorerConfig {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub push: PushConfig,
    pub logging: LoggingConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ── Config file locator ──────────────────────────────────────────────────────

/// Candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; that is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("RX_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".rx.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("remote-explorer").join("config.toml"));
    }

    paths
}

/// A config file that exists but could not be parsed.
///
/// Loading runs before logging is installed, so these are handed back for
/// the caller to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedConfig {
    pub path: PathBuf,
    pub reason: String,
}

/// Read and parse a TOML config file. Missing files are `Ok(None)`.
fn load_file(path: &Path) -> Result<Option<ExplorerConfig>, SkippedConfig> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Ok(None);
    };
    toml::from_str::<ExplorerConfig>(&content)
        .map(Some)
        .map_err(|e| SkippedConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl ExplorerConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &ExplorerConfig) -> ExplorerConfig {
        ExplorerConfig {
            server: ServerConfig {
                url: other.server.url.clone().or(self.server.url),
                push_url: other.server.push_url.clone().or(self.server.push_url),
                request_timeout_ms: other
                    .server
                    .request_timeout_ms
                    .or(self.server.request_timeout_ms),
            },
            sync: SyncConfig {
                debounce_ms: other.sync.debounce_ms.or(self.sync.debounce_ms),
                coalesce_ms: other.sync.coalesce_ms.or(self.sync.coalesce_ms),
                poll_interval_ms: other.sync.poll_interval_ms.or(self.sync.poll_interval_ms),
                push_enabled: other.sync.push_enabled.or(self.sync.push_enabled),
            },
            push: PushConfig {
                reconnect_attempts: other.push.reconnect_attempts.or(self.push.reconnect_attempts),
                reconnect_delay_ms: other.push.reconnect_delay_ms.or(self.push.reconnect_delay_ms),
                reconnect_delay_max_ms: other
                    .push
                    .reconnect_delay_max_ms
                    .or(self.push.reconnect_delay_max_ms),
            },
            logging: LoggingConfig {
                level: other.logging.level.clone().or(self.logging.level),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    /// Unparsable files are skipped and returned alongside the config.
    pub fn load(
        cli_config_path: Option<&Path>,
        cli_overrides: Option<&ExplorerConfig>,
    ) -> (ExplorerConfig, Vec<SkippedConfig>) {
        Self::load_from(&candidate_paths(), cli_config_path, cli_overrides)
    }

    fn load_from(
        candidates: &[PathBuf],
        cli_config_path: Option<&Path>,
        cli_overrides: Option<&ExplorerConfig>,
    ) -> (ExplorerConfig, Vec<SkippedConfig>) {
        let mut config = ExplorerConfig::default();
        let mut skipped = Vec::new();

        // Lowest priority first so higher ones overwrite.
        let files = candidates.iter().rev().map(PathBuf::as_path).chain(cli_config_path);
        for path in files {
            match load_file(path) {
                Ok(Some(file_cfg)) => config = config.merge(&file_cfg),
                Ok(None) => {}
                Err(skip) => skipped.push(skip),
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        (config, skipped)
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn server_url(&self) -> &str {
        self.server
            .url
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_URL)
            .trim_end_matches('/')
    }

    /// Change stream URL: explicit, or the server URL with a `ws` scheme
    /// and the `/ws` path.
    pub fn push_url(&self) -> String {
        if let Some(url) = &self.server.push_url {
            return url.clone();
        }
        let base = self.server_url();
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws", ws)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.server
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }

    pub fn push_enabled(&self) -> bool {
        self.sync.push_enabled.unwrap_or(true)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(self.sync.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            coalesce: Duration::from_millis(self.sync.coalesce_ms.unwrap_or(DEFAULT_COALESCE_MS)),
            poll_interval: Duration::from_millis(
                self.sync
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        }
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            url: self.push_url(),
            reconnect_attempts: self
                .push
                .reconnect_attempts
                .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS),
            reconnect_delay: Duration::from_millis(
                self.push
                    .reconnect_delay_ms
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
            reconnect_delay_max: Duration::from_millis(
                self.push
                    .reconnect_delay_max_ms
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_MAX_MS),
            ),
        }
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
