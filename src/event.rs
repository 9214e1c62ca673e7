use crate::error::Result;
use crate::mutation::MutationTicket;
use crate::remote::{ChangeEvent, Entry};
use crate::sync::refresh::RefreshOutcome;

/// Lifecycle and payload signals from the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushSignal {
    Connecting,
    Connected,
    Disconnected,
    /// A connection attempt failed; the transport may retry.
    ConnectError(String),
    Change(ChangeEvent),
}

/// Everything that can wake the explorer.
///
/// Network work runs in spawned tasks and reports back through this enum,
/// so all tree updates happen on the task that owns the explorer.
#[derive(Debug)]
pub enum Event {
    /// A directory listing requested by an expansion completed.
    Listing {
        path: String,
        result: Result<Vec<Entry>>,
    },
    /// A refresh fetch sequence completed.
    Refreshed {
        seq: u64,
        result: Result<RefreshOutcome>,
    },
    /// A create/rename/delete request completed.
    Mutated {
        ticket: MutationTicket,
        result: Result<()>,
    },
    /// Signal from the push transport.
    Push(PushSignal),
    /// The coalescing window after the first push change has elapsed.
    CoalesceElapsed,
    /// Fallback polling timer fired.
    PollTick,
}
