//! Observability for the exporter process.
//!
//! Structured logging is set up here; the exporter's own scrape metrics live
//! with the orchestrator in [`crate::exporter`].

mod tracing_init;

pub use tracing_init::*;
