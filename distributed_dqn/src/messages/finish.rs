//! Worker termination reporting.

use std::fmt;

/// Reason why a worker thread finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal shutdown after a stop request.
    Stopped,

    /// Thread panicked.
    Panicked(String),

    /// Worker reached its step budget.
    Completed,

    /// Worker gave up on an unrecoverable error.
    Failed(String),
}

impl FinishReason {
    /// Build from a joined thread's result.
    pub fn from_join(result: std::thread::Result<FinishReason>) -> Self {
        match result {
            Ok(reason) => reason,
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                FinishReason::Panicked(message)
            }
        }
    }

    /// Whether the worker ended without error.
    pub fn is_clean(&self) -> bool {
        matches!(self, FinishReason::Stopped | FinishReason::Completed)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stopped => write!(f, "stopped"),
            FinishReason::Panicked(msg) => write!(f, "panicked: {}", msg),
            FinishReason::Completed => write!(f, "completed"),
            FinishReason::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// One node's exit status, as collected by the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFinished {
    /// Thread name of the node.
    pub node: String,
    /// How it ended.
    pub reason: FinishReason,
}
