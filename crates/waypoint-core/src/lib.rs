//! Resumable flow execution repository.
//!
//! Keeps paused flow executions alive between independent request/response
//! cycles. A conversation groups the continuations (immutable snapshots) of
//! one user interaction; a flow execution key names one continuation; the
//! repository facade ties the conversation registry, the snapshot codec and
//! the state restorer together behind create/save/load.

pub mod continuation;
pub mod conversation;
pub mod definition;
pub mod engine;
pub mod repository;
