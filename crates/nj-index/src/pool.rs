// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded ring of pre-allocated [`ChunkIndex`] records.
//!
//! The pool owns every record for the lifetime of a query and lends them
//! out: the producer reserves a slot, fills it, and releases it into the
//! ring; the consumer claims the oldest committed slot and releases it back
//! once drained. Records flow in strict FIFO order.
//!
//! The producer may hold more than one reservation at a time: with ping-pong
//! staging the current chunk's slot is reserved while the previous chunk's
//! slot is still being finalized. The `reserved` cursor tracks handed-out
//! slots separately from the committed `write` cursor; commits still happen
//! in reservation order.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use nj_core::error::EngineError;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Condvar, Mutex, RawMutex};

use crate::chunk::{ChunkConfig, ChunkIndex};

type SlotGuard = ArcMutexGuard<RawMutex, ChunkIndex>;

/// Reference ring depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Default)]
struct Cursors {
    /// Oldest slot still owned by the consumer side.
    read: usize,
    /// Next slot to become visible to the consumer.
    write: usize,
    /// Next slot to hand to the producer.
    reserved: usize,
    /// Producer committed its last chunk.
    finished: bool,
    /// Either side tore the pipeline down.
    cancelled: bool,
}

/// Fixed ring of chunk-index records with blocking producer/consumer
/// handoff.
#[derive(Debug)]
pub struct IndexPool {
    slots: Vec<Arc<Mutex<ChunkIndex>>>,
    state: Mutex<Cursors>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl IndexPool {
    /// Allocate a ring of `depth` records sized for `config`.
    ///
    /// # Errors
    ///
    /// `depth` must be at least 2.
    pub fn new(config: &ChunkConfig, depth: usize) -> Result<Arc<Self>, EngineError> {
        if depth < 2 {
            return Err(EngineError::InvalidConfig("queue depth must be at least 2"));
        }
        let slots = (0..depth)
            .map(|_| Arc::new(Mutex::new(ChunkIndex::with_config(config))))
            .collect();
        Ok(Arc::new(Self {
            slots,
            state: Mutex::new(Cursors::default()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity: depth,
        }))
    }

    /// Reserve the next write slot, blocking while the ring is full.
    ///
    /// Returns `None` when the pipeline has been cancelled.
    pub fn reserve_write(self: &Arc<Self>) -> Option<WriteSlot> {
        let seq = {
            let mut state = self.state.lock();
            while state.reserved - state.read == self.capacity && !state.cancelled {
                self.not_full.wait(&mut state);
            }
            if state.cancelled {
                return None;
            }
            let seq = state.reserved;
            state.reserved += 1;
            seq
        };
        let guard = self.slots[seq % self.capacity].lock_arc();
        Some(WriteSlot {
            pool: Arc::clone(self),
            guard,
            seq,
        })
    }

    /// Claim the oldest committed slot, blocking while the ring is empty.
    ///
    /// Returns `None` once the producer has finished and the ring is
    /// drained, or when the pipeline has been cancelled.
    pub fn claim_read(self: &Arc<Self>) -> Option<ReadSlot> {
        let seq = {
            let mut state = self.state.lock();
            while state.read == state.write && !state.finished && !state.cancelled {
                self.not_empty.wait(&mut state);
            }
            if state.cancelled || state.read == state.write {
                return None;
            }
            state.read
        };
        let guard = self.slots[seq % self.capacity].lock_arc();
        Some(ReadSlot {
            pool: Arc::clone(self),
            guard,
            seq,
        })
    }

    /// Mark the producer side as done and wake any waiting consumer.
    pub fn finish_producing(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        drop(state);
        self.not_empty.notify_all();
    }

    /// Tear the pipeline down; unblocks both sides.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Restore the ring to its initial state.
    ///
    /// Only legal once no reservation or claim is outstanding.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = Cursors::default();
    }

    fn commit_write(&self, seq: usize) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.write, seq, "writes commit in reservation order");
        state.write = seq + 1;
        drop(state);
        self.not_empty.notify_one();
    }

    fn commit_read(&self, seq: usize) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.read, seq);
        state.read = seq + 1;
        drop(state);
        self.not_full.notify_one();
    }
}

/// Exclusive producer-side handle to one ring record.
pub struct WriteSlot {
    pool: Arc<IndexPool>,
    guard: SlotGuard,
    seq: usize,
}

impl fmt::Debug for WriteSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSlot")
            .field("pool", &self.pool)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl WriteSlot {
    /// Commit the record, making it visible to the consumer.
    pub fn release(self) {
        let Self { pool, guard, seq } = self;
        drop(guard);
        pool.commit_write(seq);
    }
}

impl Deref for WriteSlot {
    type Target = ChunkIndex;

    fn deref(&self) -> &ChunkIndex {
        &self.guard
    }
}

impl DerefMut for WriteSlot {
    fn deref_mut(&mut self) -> &mut ChunkIndex {
        &mut self.guard
    }
}

/// Exclusive consumer-side handle to one ring record.
pub struct ReadSlot {
    pool: Arc<IndexPool>,
    guard: SlotGuard,
    seq: usize,
}

impl fmt::Debug for ReadSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSlot")
            .field("pool", &self.pool)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl ReadSlot {
    /// Return the record to the ring, freeing the slot for the producer.
    pub fn release(self) {
        let Self { pool, guard, seq } = self;
        drop(guard);
        pool.commit_read(seq);
    }
}

impl Deref for ReadSlot {
    type Target = ChunkIndex;

    fn deref(&self) -> &ChunkIndex {
        &self.guard
    }
}
