//! Core types: event times, query windows, generic events, tracing

pub mod event;
pub mod time;
pub mod tracing;

pub use event::{EventInput, ExtendedProps};
pub use time::{EventTime, TimeWindow};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
