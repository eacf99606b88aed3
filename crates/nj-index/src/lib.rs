// SPDX-License-Identifier: MIT OR Apache-2.0
//! SIMD-friendly structural indexing for nj
//!
//! Turns raw JSON bytes into a stream of positions of unquoted structural
//! characters (`{ } [ ] : ,`), chunk by chunk, on a background worker:
//!
//! - [`bits`] - prefix-XOR, byte-match masks, escape-run classification
//! - [`chunk`] - per-chunk indexing with inter-chunk carries
//! - [`pool`] - bounded ring of pre-allocated chunk indices
//! - [`pipeline`] - background worker and the consumer-side stream

/// Bit-level primitives over 64-byte vectors
pub mod bits;
/// Per-chunk structural indexing
pub mod chunk;
/// Background worker and structural stream
pub mod pipeline;
/// Bounded ring of chunk-index records
pub mod pool;

pub use chunk::{Carries, ChunkConfig, ChunkIndex, Staging};
pub use pipeline::{spawn_indexer, StructuralStream};
pub use pool::{IndexPool, ReadSlot, WriteSlot, DEFAULT_QUEUE_DEPTH};
