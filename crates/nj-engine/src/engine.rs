// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine façade: binds a compiled program to a document and runs the
//! two-stage pipeline.

use std::sync::Arc;

use nj_core::error::{EngineError, IndexerError, NjError, Result};
use nj_core::result::ResultSet;
use nj_core::trace::Tracer;
use nj_index::chunk::ChunkConfig;
use nj_index::pipeline::{spawn_indexer, StructuralStream};
use nj_index::pool::{IndexPool, DEFAULT_QUEUE_DEPTH};
use nj_query::Program;

use crate::automaton::Automaton;

/// Engine configuration: chunk geometry and ring depth.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Chunk/block geometry for the indexer.
    pub chunk: ChunkConfig,
    /// Number of chunk-index records in the ring.
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// A compiled query bound to a document.
///
/// The ring pool and its records are allocated once at construction;
/// [`run`](Self::run) is re-entrant per engine instance.
#[derive(Debug)]
pub struct Engine {
    program: Program,
    doc: Arc<[u8]>,
    config: EngineConfig,
    pool: Arc<IndexPool>,
    tracer: Tracer,
}

impl Engine {
    /// Bind `program` to `doc` with the default configuration.
    ///
    /// # Errors
    ///
    /// Rejects an empty document and a program that does not end with a
    /// record step.
    pub fn new(program: Program, doc: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::with_config(program, doc, EngineConfig::default(), Tracer::disabled())
    }

    /// Bind with an explicit configuration and tracer.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new); additionally rejects invalid chunk geometry
    /// and ring depths below 2.
    pub fn with_config(
        program: Program,
        doc: impl Into<Arc<[u8]>>,
        config: EngineConfig,
        tracer: Tracer,
    ) -> Result<Self> {
        let doc = doc.into();
        if doc.is_empty() {
            return Err(EngineError::EmptyDocument.into());
        }
        if program.is_empty() || !program.ends_with_record() {
            return Err(EngineError::InvalidProgram("program must end with a record step").into());
        }
        let pool = IndexPool::new(&config.chunk, config.queue_depth).map_err(NjError::Engine)?;
        Ok(Self {
            program,
            doc,
            config,
            pool,
            tracer,
        })
    }

    /// The bound document bytes.
    #[must_use]
    pub fn doc(&self) -> &[u8] {
        &self.doc
    }

    /// Execute the query and collect the matching spans.
    ///
    /// Spawns the indexer worker, drives the automaton on the calling
    /// thread, then tears the pipeline down. An indexer failure takes
    /// precedence over the automaton error it usually induces.
    ///
    /// # Errors
    ///
    /// Any fatal [`EngineError`] or [`IndexerError`].
    pub fn run(&mut self) -> Result<ResultSet> {
        self.pool.reset();
        let worker = spawn_indexer(
            Arc::clone(&self.doc),
            Arc::clone(&self.pool),
            self.config.chunk,
            self.tracer.clone(),
        );

        let mut stream = StructuralStream::new(Arc::clone(&self.pool));
        let trace = self.tracer.start("automaton");
        let outcome = Automaton::new(&self.program, &self.doc, &mut stream).run();
        self.tracer.finish(trace);
        drop(stream);

        let worker_outcome = worker.join().map_err(|_| IndexerError::WorkerLost)?;
        worker_outcome?;
        Ok(outcome?)
    }
}
