//! Observability for Waypoint: tracing subscriber setup and shutdown.

pub mod tracing_setup;
