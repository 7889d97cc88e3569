//! Route discovery: hop-by-hop echo probing with per-hop statistics

pub mod api;
#[cfg(feature = "async")]
pub mod async_api;
pub mod config;
pub mod engine;
pub mod observer;
pub mod result;
pub mod types;


// Re-export commonly used types
pub use api::{trace, trace_with_observer};
#[cfg(feature = "async")]
pub use async_api::{ping_async, spawn_trace, spawn_trace_with_events, spawn_trace_with_probe, TraceHandle};
pub use config::{TracerouteConfig, TracerouteConfigBuilder};
pub use engine::{HopAggregator, RouteTracer};
pub use observer::{CancelOnToken, FnObserver, TraceEvent, TraceObserver};
pub use result::TraceResult;
pub use types::{HopSummary, TraceStatus};
