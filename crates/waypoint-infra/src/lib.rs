//! Infrastructure layer for Waypoint.
//!
//! Filesystem-facing concerns that the core crate stays free of.

pub mod config;
