//! Synchronization channel: push notifications, coalescing, debounced
//! refresh and fallback polling.
//!
//! Push changes and poll ticks are two producers of the same "refresh
//! requested" signal; the explorer is its single consumer.

pub mod push;
pub mod refresh;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::event::Event;
use refresh::RefreshGate;

/// Default window for collapsing a burst of push changes.
pub const DEFAULT_COALESCE_MS: u64 = 500;

/// Default fallback polling period while the push channel is down.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Push channel connection state as observed by the explorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Timing knobs for the synchronization channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce: Duration,
    pub coalesce: Duration,
    pub poll_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(refresh::DEFAULT_DEBOUNCE_MS),
            coalesce: Duration::from_millis(DEFAULT_COALESCE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Refresh bookkeeping and the timers that feed refresh requests.
#[derive(Debug)]
pub struct SyncChannel {
    settings: SyncSettings,
    gate: RefreshGate,
    connection: ConnectionState,
    coalescing: bool,
    poller: Option<JoinHandle<()>>,
    next_seq: u64,
    applied_seq: u64,
    refreshes_in_flight: usize,
}

impl SyncChannel {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            gate: RefreshGate::new(settings.debounce),
            connection: ConnectionState::Disconnected,
            coalescing: false,
            poller: None,
            next_seq: 0,
            applied_seq: 0,
            refreshes_in_flight: 0,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state;
    }

    /// A refresh fetch sequence is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.refreshes_in_flight > 0
    }

    /// Try to start a refresh. Returns its sequence number, or `None` when
    /// the debounce gate skips it.
    pub fn begin_refresh(&mut self) -> Option<u64> {
        if !self.gate.try_begin(Instant::now()) {
            debug!("refresh skipped by debounce");
            return None;
        }
        Some(self.issue_seq())
    }

    /// Start a refresh regardless of the gate (mutation confirmations).
    pub fn force_refresh(&mut self) -> u64 {
        self.gate.force(Instant::now());
        self.issue_seq()
    }

    fn issue_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.refreshes_in_flight += 1;
        self.next_seq
    }

    /// Record a finished refresh. Returns `false` if a newer one has
    /// already been applied and this result must be dropped.
    pub fn finish_refresh(&mut self, seq: u64) -> bool {
        self.refreshes_in_flight = self.refreshes_in_flight.saturating_sub(1);
        if seq < self.applied_seq {
            debug!(seq, applied = self.applied_seq, "dropping stale refresh");
            return false;
        }
        self.applied_seq = seq;
        true
    }

    /// Open a coalescing window unless one is already pending.
    ///
    /// Returns `true` if a new window was opened.
    pub fn schedule_coalesced(&mut self, tx: &mpsc::UnboundedSender<Event>) -> bool {
        if self.coalescing {
            return false;
        }
        self.coalescing = true;
        let window = self.settings.coalesce;
        let tx = tx.clone();
        tokio::spawn(async move {
            time::sleep(window).await;
            let _ = tx.send(Event::CoalesceElapsed);
        });
        true
    }

    /// The coalescing window closed.
    pub fn coalesce_elapsed(&mut self) {
        self.coalescing = false;
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Start the fallback poller if it is not running.
    pub fn start_polling(&mut self, tx: &mpsc::UnboundedSender<Event>) {
        if self.poller.is_some() {
            return;
        }
        let period = self.settings.poll_interval;
        let tx = tx.clone();
        debug!(?period, "fallback polling started");
        self.poller = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if tx.send(Event::PollTick).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn stop_polling(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
            debug!("fallback polling stopped");
        }
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(1000),
            coalesce: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn begin_refresh_is_debounced() {
        let mut sync = SyncChannel::new(settings());
        assert_eq!(sync.begin_refresh(), Some(1));
        time::advance(Duration::from_millis(400)).await;
        assert_eq!(sync.begin_refresh(), None);
        time::advance(Duration::from_millis(600)).await;
        assert_eq!(sync.begin_refresh(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_bypasses_gate() {
        let mut sync = SyncChannel::new(settings());
        assert!(sync.begin_refresh().is_some());
        assert_eq!(sync.force_refresh(), 2);
        assert!(sync.begin_refresh().is_none());
    }

    #[test]
    fn stale_refresh_results_are_dropped() {
        let mut sync = SyncChannel::new(settings());
        let first = sync.force_refresh();
        let second = sync.force_refresh();
        assert!(sync.is_refreshing());
        assert!(sync.finish_refresh(second));
        assert!(!sync.finish_refresh(first));
        assert!(!sync.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn coalescing_opens_one_window() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = SyncChannel::new(settings());
        assert!(sync.schedule_coalesced(&tx));
        assert!(!sync.schedule_coalesced(&tx));
        assert!(matches!(rx.recv().await, Some(Event::CoalesceElapsed)));
        sync.coalesce_elapsed();
        assert!(sync.schedule_coalesced(&tx));
    }

    #[tokio::test(start_paused = true)]
    async fn poller_ticks_until_stopped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = SyncChannel::new(settings());
        sync.start_polling(&tx);
        let started = Instant::now();
        assert!(matches!(rx.recv().await, Some(Event::PollTick)));
        assert!(started.elapsed() >= Duration::from_millis(10_000));
        sync.stop_polling();
        assert!(!sync.is_polling());
        drop(tx);
        // Once the aborted poller drops its sender the channel closes.
        while let Some(event) = rx.recv().await {
            assert!(matches!(event, Event::PollTick));
        }
    }
}
