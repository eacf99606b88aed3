// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background indexing worker and the consumer-side structural stream.
//!
//! The worker walks the document chunk by chunk. Each iteration reserves a
//! ring slot, stages the current chunk (phase A), then finalizes the
//! *previous* chunk's staging into its slot and releases it (phase B). Two
//! staging buffers alternate, so the expensive staged pass for chunk `n`
//! overlaps the finalization of chunk `n - 1`. A slot is never released
//! before its finalization completes.
//!
//! The consumer side exposes a strictly sequential stream of structural
//! positions with a one-slot pushback. A structural that belongs to two
//! automaton states is pushed back by the first and re-consumed by the
//! second.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nj_core::error::IndexerError;
use nj_core::trace::Tracer;

use crate::chunk::{finalize_chunk, stage_chunk, Carries, ChunkConfig, Staging};
use crate::pool::{IndexPool, ReadSlot, WriteSlot};

/// Spawn the indexer worker for `doc`.
///
/// The worker indexes every chunk in order, publishing records through
/// `pool`, and stops early if the pool is cancelled. On an internal indexing
/// error it cancels the pool itself so the consumer cannot block forever.
#[must_use]
pub fn spawn_indexer(
    doc: Arc<[u8]>,
    pool: Arc<IndexPool>,
    config: ChunkConfig,
    tracer: Tracer,
) -> JoinHandle<Result<(), IndexerError>> {
    thread::spawn(move || {
        let result = run_indexer(&doc, &pool, &config, &tracer);
        match result {
            Ok(()) => pool.finish_producing(),
            Err(_) => pool.cancel(),
        }
        result
    })
}

fn run_indexer(
    doc: &[u8],
    pool: &Arc<IndexPool>,
    config: &ChunkConfig,
    tracer: &Tracer,
) -> Result<(), IndexerError> {
    let mut staging = [Staging::with_config(config), Staging::with_config(config)];
    let mut carries = Carries::default();
    let mut pending: Option<(WriteSlot, usize)> = None;
    let mut front = 0;

    for chunk in 0..config.chunk_count(doc.len()) {
        let Some(slot) = pool.reserve_write() else {
            // Cancelled; drop any pending slot without committing it.
            return Ok(());
        };

        let trace = tracer.start("index_stage");
        stage_chunk(
            doc,
            chunk * config.chunk_size(),
            carries.escape,
            config,
            &mut staging[front],
        );
        tracer.finish(trace);
        carries.escape = staging[front].escape_out();

        if let Some((mut prev_slot, back)) = pending.take() {
            let trace = tracer.start("index_finalize");
            carries.string =
                finalize_chunk(&staging[back], carries.string, config, &mut prev_slot)?.string;
            tracer.finish(trace);
            prev_slot.release();
        }

        pending = Some((slot, front));
        front ^= 1;
    }

    if let Some((mut slot, back)) = pending.take() {
        let trace = tracer.start("index_finalize");
        finalize_chunk(&staging[back], carries.string, config, &mut slot)?;
        tracer.finish(trace);
        slot.release();
    }
    Ok(())
}

/// Sequential stream of structural positions with a one-slot pushback.
///
/// Holds at most one claimed ring record at a time; dropping the stream
/// cancels the pipeline.
#[derive(Debug)]
pub struct StructuralStream {
    pool: Arc<IndexPool>,
    current: Option<ReadSlot>,
    cursor: usize,
    pushback: Option<u32>,
}

impl StructuralStream {
    /// Attach a stream to the consumer side of `pool`.
    #[must_use]
    pub fn new(pool: Arc<IndexPool>) -> Self {
        Self {
            pool,
            current: None,
            cursor: 0,
            pushback: None,
        }
    }

    /// The next structural position, or `None` at end of input.
    ///
    /// A pushed-back position is returned first.
    pub fn next_structural(&mut self) -> Option<u32> {
        if let Some(pos) = self.pushback.take() {
            return Some(pos);
        }
        loop {
            if let Some(slot) = &self.current {
                if let Some(&pos) = slot.structurals().get(self.cursor) {
                    self.cursor += 1;
                    return Some(pos);
                }
            }
            if let Some(exhausted) = self.current.take() {
                exhausted.release();
            }
            self.cursor = 0;
            match self.pool.claim_read() {
                Some(slot) => self.current = Some(slot),
                None => return None,
            }
        }
    }

    /// Push one position back; it becomes the next value returned.
    ///
    /// The slot holds at most one position and must be empty.
    pub fn put_back(&mut self, pos: u32) {
        debug_assert!(self.pushback.is_none(), "pushback slot already occupied");
        self.pushback = Some(pos);
    }
}

impl Drop for StructuralStream {
    fn drop(&mut self) {
        if let Some(slot) = self.current.take() {
            slot.release();
        }
        self.pool.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DEFAULT_QUEUE_DEPTH;

    fn collect_positions(doc: &[u8], config: &ChunkConfig) -> Vec<u32> {
        let doc: Arc<[u8]> = Arc::from(doc);
        let pool = IndexPool::new(config, DEFAULT_QUEUE_DEPTH).unwrap();
        let worker = spawn_indexer(
            Arc::clone(&doc),
            Arc::clone(&pool),
            *config,
            Tracer::disabled(),
        );
        let mut stream = StructuralStream::new(pool);
        let mut positions = Vec::new();
        while let Some(pos) = stream.next_structural() {
            positions.push(pos);
        }
        drop(stream);
        worker.join().unwrap().unwrap();
        positions
    }

    #[test]
    fn streams_positions_across_chunks() {
        let config = ChunkConfig::new(64, 64).unwrap();
        let mut doc = Vec::new();
        doc.extend_from_slice(b"{\"key\":");
        doc.resize(100, b' ');
        doc.extend_from_slice(b"[1,2]}");
        let positions = collect_positions(&doc, &config);
        assert_eq!(positions, [0, 6, 100, 102, 104, 105]);
    }

    #[test]
    fn put_back_returns_position_first() {
        let config = ChunkConfig::new(64, 64).unwrap();
        let doc: Arc<[u8]> = Arc::from(&br#"{"a":1}"#[..]);
        let pool = IndexPool::new(&config, 2).unwrap();
        let worker = spawn_indexer(
            Arc::clone(&doc),
            Arc::clone(&pool),
            config,
            Tracer::disabled(),
        );
        let mut stream = StructuralStream::new(pool);
        let first = stream.next_structural().unwrap();
        assert_eq!(first, 0);
        stream.put_back(first);
        assert_eq!(stream.next_structural(), Some(0));
        assert_eq!(stream.next_structural(), Some(4));
        drop(stream);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn dropping_the_stream_cancels_the_worker() {
        let config = ChunkConfig::new(64, 64).unwrap();
        // Plenty of chunks so the worker outlives the first claim.
        let doc: Arc<[u8]> = Arc::from(vec![b'[', b'1', b',', b'2', b']'].repeat(200));
        let pool = IndexPool::new(&config, 2).unwrap();
        let worker = spawn_indexer(
            Arc::clone(&doc),
            Arc::clone(&pool),
            config,
            Tracer::disabled(),
        );
        let mut stream = StructuralStream::new(pool);
        let _ = stream.next_structural();
        drop(stream);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn empty_document_yields_no_positions() {
        let config = ChunkConfig::new(64, 64).unwrap();
        assert!(collect_positions(b"", &config).is_empty());
    }
}
