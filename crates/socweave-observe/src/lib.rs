//! Observability setup for Socweave.

pub mod tracing_setup;
