//! Core types shared by every component.

pub mod clock;
pub mod model_version;
pub mod transition;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use model_version::{Snapshot, VersionCounter};
pub use transition::{StepType, TimeStep, Transition};
