//! Messages for the counter service thread.

use crossbeam_channel::Sender;
use std::collections::BTreeMap;

/// Field name to count, for one namespace.
pub type Counts = BTreeMap<String, u64>;

/// Every namespace's counts.
pub type CounterSnapshot = BTreeMap<String, Counts>;

/// Requests handled by the counter service.
///
/// Every request except `Stop` carries the sender the reply goes back on.
#[derive(Debug)]
pub enum CounterMsg {
    /// Add `deltas` to `namespace` and reply with the namespace totals.
    Increment {
        namespace: String,
        deltas: Vec<(String, u64)>,
        reply: Sender<Counts>,
    },

    /// Reply with the totals of one namespace (empty if unknown).
    Get {
        namespace: String,
        reply: Sender<Counts>,
    },

    /// Reply with every namespace.
    Snapshot { reply: Sender<CounterSnapshot> },

    /// Persist and exit.
    Stop,
}
