//! Shared step and episode counts.
//!
//! A single service thread owns `namespace -> field -> count`; every other
//! component holds a [`CounterClient`] (or a [`ScopedCounter`]) and talks to
//! it by message passing.

pub mod service;


pub use service::{
    spawn_counter, CounterClient, CounterConfig, CounterError, CounterHandle, ScopedCounter,
};
