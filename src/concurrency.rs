//! Tracks the writer mutex and the set of active snapshot readers.
//!
//! Owned as a field of [`crate::database::Database`] rather than kept in a
//! process-wide registry keyed by handle identity (see the design doc's
//! redesign notes) — each open database gets its own controller, so two
//! handles can never cross-contaminate each other's reader bookkeeping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::debug;

/// Held for the entire lifetime of a write transaction; serializes writers.
pub type WriterPermit<'c> = MutexGuard<'c, ()>;

struct ReaderTable {
    next_id: u64,
    seqs: HashMap<u64, u64>,
}

pub struct ConcurrencyController {
    writer: Mutex<()>,
    readers: Mutex<ReaderTable>,
}

impl ConcurrencyController {
    pub fn new() -> ConcurrencyController {
        ConcurrencyController {
            writer: Mutex::new(()),
            readers: Mutex::new(ReaderTable {
                next_id: 0,
                seqs: HashMap::new(),
            }),
        }
    }

    /// Block until no other writer is active, then hold the returned permit
    /// for the whole transaction.
    pub fn begin_write(&self) -> WriterPermit<'_> {
        self.writer.lock().unwrap()
    }

    /// Register a new reader pinned at `seq` (the free list's tail sequence
    /// at the moment its snapshot was taken).
    pub fn begin_read(&self, seq: u64) -> ReaderGuard<'_> {
        let mut table = self.readers.lock().unwrap();
        table.next_id += 1;
        let id = table.next_id;
        table.seqs.insert(id, seq);
        debug!("concurrency: reader {} began at seq {}", id, seq);
        ReaderGuard { cc: self, id, seq }
    }

    /// The minimum pinned sequence among active readers, or `u64::MAX` if
    /// none are active — the gate that free-list reuse must respect.
    pub fn oldest_active_reader_seq(&self) -> u64 {
        let table = self.readers.lock().unwrap();
        table.seqs.values().copied().min().unwrap_or(u64::MAX)
    }
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        ConcurrencyController::new()
    }
}

/// A reservation on a snapshot sequence number. Releasing is just dropping
/// the guard (or calling `end()`, which does the same thing explicitly);
/// ownership means a second release can't happen, so there is no separate
/// "already ended" state to track.
pub struct ReaderGuard<'c> {
    cc: &'c ConcurrencyController,
    id: u64,
    seq: u64,
}

impl ReaderGuard<'_> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn end(self) {}
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.cc.readers.lock().unwrap();
        table.seqs.remove(&self.id);
        debug!("concurrency: reader {} ended", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_readers_means_oldest_seq_is_max() {
        let cc = ConcurrencyController::new();
        assert_eq!(cc.oldest_active_reader_seq(), u64::MAX);
    }

    #[test]
    fn oldest_seq_tracks_the_minimum_across_active_readers() {
        let cc = ConcurrencyController::new();
        let a = cc.begin_read(5);
        let b = cc.begin_read(2);
        assert_eq!(cc.oldest_active_reader_seq(), 2);
        drop(b);
        assert_eq!(cc.oldest_active_reader_seq(), 5);
        drop(a);
        assert_eq!(cc.oldest_active_reader_seq(), u64::MAX);
    }

    #[test]
    fn writer_permit_blocks_a_second_writer() {
        let cc = ConcurrencyController::new();
        let permit = cc.begin_write();
        assert!(cc.writer.try_lock().is_err());
        drop(permit);
        assert!(cc.writer.try_lock().is_ok());
    }
}
