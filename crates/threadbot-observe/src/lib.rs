//! Observability setup for Threadbot: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
