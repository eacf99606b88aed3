// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streaming JSONPath evaluation for nj
//!
//! Couples the structural indexer (producer thread) with a compiled-bytecode
//! pushdown automaton (consumer thread) over a bounded ring of chunk
//! indices, recording matches as byte spans into the source document:
//!
//! ```
//! use nj_engine::Engine;
//! use nj_query::{Program, Query};
//!
//! let doc = br#"{"items":[{"v":1},{"v":2}]}"#.to_vec();
//! let program = Program::compile(&Query::parse("$.items[*].v")?)?;
//! let mut engine = Engine::new(program, doc)?;
//! let results = engine.run()?;
//! assert_eq!(results.count(), 2);
//! assert_eq!(results.extract(0, engine.doc()), b"1");
//! # Ok::<(), nj_core::error::NjError>(())
//! ```

mod automaton;
/// Engine façade
pub mod engine;

pub use engine::{Engine, EngineConfig};
