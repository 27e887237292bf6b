//! Shared domain types for Waypoint.
//!
//! This crate contains the types exchanged between the repository and its
//! callers: conversation and continuation ids, flow execution keys, the flow
//! definition graph, the execution-state object that gets snapshotted between
//! requests, and the error and configuration types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod config;
pub mod definition;
pub mod error;
pub mod execution;
pub mod id;
pub mod key;
pub mod scope;
