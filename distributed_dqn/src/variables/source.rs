//! Where parameter snapshots come from.

use crate::core::Snapshot;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error type for parameter fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableError {
    /// Nothing has been published yet, or the source is temporarily unreachable.
    Unavailable,
    /// The source was shut down; retrying is pointless.
    Closed,
    /// The cache ran out of retries while its snapshot was too old.
    Stale {
        /// Age of the snapshot that was refused.
        age: Duration,
    },
}

impl fmt::Display for VariableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableError::Unavailable => write!(f, "variables unavailable"),
            VariableError::Closed => write!(f, "variable source closed"),
            VariableError::Stale { age } => write!(f, "variables stale ({:?} old)", age),
        }
    }
}

impl std::error::Error for VariableError {}

/// Anything actors can pull parameter snapshots from: the learner's slot
/// directly, or a cache in front of it.
pub trait VariableSource<P>: Send + Sync {
    /// Latest available snapshot.
    fn get_variables(&self) -> Result<Snapshot<P>, VariableError>;
}

impl<P, S: VariableSource<P> + ?Sized> VariableSource<P> for Arc<S> {
    fn get_variables(&self) -> Result<Snapshot<P>, VariableError> {
        (**self).get_variables()
    }
}

/// Type-erased shared source.
pub type SharedVariableSource<P> = Arc<dyn VariableSource<P>>;
