//! Patchgrade-State: the failure-recording channel
//!
//! The evaluation core never persists anything itself. Responses that do not
//! survive sandbox verification are reported through a [`FailureRecorder`],
//! which is the seam to whatever store the caller owns.
//!
//! ## Key Components
//!
//! - `ResponseId`: opaque identifier of one submitted response
//! - `FailureRecorder`: idempotent, append-safe `mark_failed` sink
//! - `fakes::MemoryFailureRecorder`: in-memory implementation for tests
//! - `JsonlFailureRecorder`: append-only JSON-lines file backend

mod error;
pub mod fakes;
pub mod failure_traits;
mod jsonl;

pub use error::StateError;
pub use failure_traits::{FailureRecord, FailureRecorder, ResponseId, StateResult};
pub use jsonl::JsonlFailureRecorder;
