//! Observability utilities: subscriber setup, span attributes and timing.

mod tracing;

pub use tracing::{init_tracing, SessionSpanAttributes, SpanTimer, TracingOptions};
