//! WebSocket push transport.
//!
//! Owns reconnection: bounded attempts with exponential backoff. The
//! explorer only sees the resulting lifecycle signals.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::event::{Event, PushSignal};
use crate::remote::ChangeEvent;

/// Default consecutive failed connection attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
/// Default delay before the first reconnect.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;
/// Default upper bound for the reconnect delay.
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5000;

/// Connection parameters for the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
}

impl PushSettings {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            reconnect_delay_max: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MAX_MS),
        }
    }
}

/// Push channel over a WebSocket carrying JSON change frames.
pub struct WsPushTransport;

impl WsPushTransport {
    /// Spawn the transport. It stops when the explorer drops its receiver
    /// or after too many consecutive failed connection attempts.
    pub fn spawn(settings: PushSettings, tx: mpsc::UnboundedSender<Event>) -> JoinHandle<()> {
        tokio::spawn(run(settings, tx))
    }
}

async fn run(settings: PushSettings, tx: mpsc::UnboundedSender<Event>) {
    let send = |signal: PushSignal| tx.send(Event::Push(signal)).is_ok();
    let mut failures: u32 = 0;
    let mut delay = settings.reconnect_delay;

    loop {
        if !send(PushSignal::Connecting) {
            return;
        }
        match connect_async(settings.url.as_str()).await {
            Ok((mut stream, _)) => {
                failures = 0;
                delay = settings.reconnect_delay;
                info!(url = %settings.url, "push channel connected");
                if !send(PushSignal::Connected) {
                    return;
                }
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => match parse_frame(&text) {
                            Ok(Some(change)) => {
                                if !send(PushSignal::Change(change)) {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => warn!(error = %e, "ignoring malformed push frame"),
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "push channel read failed");
                            break;
                        }
                    }
                }
                if !send(PushSignal::Disconnected) {
                    return;
                }
            }
            Err(e) => {
                failures += 1;
                warn!(url = %settings.url, attempt = failures, error = %e, "push connect failed");
                if !send(PushSignal::ConnectError(e.to_string())) {
                    return;
                }
                if failures >= settings.reconnect_attempts {
                    warn!("push channel giving up after {} attempts", failures);
                    return;
                }
            }
        }
        tokio::time::sleep(delay).await;
        delay = next_delay(delay, settings.reconnect_delay_max);
    }
}

/// Double the delay, capped at `max`.
pub fn next_delay(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Decode one text frame.
///
/// Accepts either an envelope `{"event": "file_change", "data": {...}}` or
/// a bare change object. Other envelopes yield `Ok(None)`.
pub fn parse_frame(text: &str) -> Result<Option<ChangeEvent>> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("event").and_then(Value::as_str) {
        Some("file_change") => {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            Ok(Some(serde_json::from_value(data)?))
        }
        Some("connection_established") => {
            info!("push channel handshake acknowledged");
            Ok(None)
        }
        Some(other) => {
            debug!(event = other, "ignoring push event");
            Ok(None)
        }
        None => Ok(Some(serde_json::from_value(value)?)),
    }
}
