// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core types, error handling, and result recording for nj
//!
//! This crate provides the foundational types used across the nj workspace:
//!
//! - [`error`] - Error types and Result alias
//! - [`result`] - Query result spans
//! - [`trace`] - Opt-in per-stage timing traces

/// Error types for nj operations
pub mod error;
/// Query result spans
pub mod result;
/// Opt-in per-stage timing traces
pub mod trace;

pub use error::{EngineError, IndexerError, NjError, QueryError, Result};
pub use result::{ResultSet, Span};
pub use trace::{TraceId, Tracer};
