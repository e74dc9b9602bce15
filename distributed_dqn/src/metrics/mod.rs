//! Metrics logging.
//!
//! - [`ConsoleLogger`]: time-throttled output through the `log` facade
//! - [`CsvLogger`]: CSV file logging for analysis
//! - [`MemoryLogger`]: shared in-memory sink
//! - [`MultiLogger`]: combine multiple loggers
//! - [`NullLogger`]: discard everything

pub mod logger;

pub use logger::{
    make_default_logger,
    metrics,
    BoxedLogger,
    ConsoleLogger,
    CsvLogger,
    MemoryLogger,
    Metrics,
    MetricsLogger,
    MultiLogger,
    NullLogger,
};
