//! Core types: provider ids, unified events, time windows, tracing

pub mod event;
pub mod time;
pub mod tracing;

pub use event::{ProviderId, UnifiedEvent, UnknownProviderId, sort_events};
pub use time::TimeWindow;
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
