//! Call announcement sequencer
//!
//! Turns overlapping newest-first "recently called" snapshots into a single
//! oldest-first stream of announcements, each call appearing exactly once.

use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace};

use crate::model::{CallRecord, DedupKey};

#[derive(Debug, Default)]
pub struct CallSequencer {
    /// Calls waiting to be announced, oldest first
    queue: VecDeque<CallRecord>,
    /// Every key ever enqueued; never shrinks
    seen: HashSet<DedupKey>,
}

impl CallSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one snapshot (newest first). Returns how many calls were enqueued.
    ///
    /// The snapshot is walked in reverse so the queue keeps true call order,
    /// trusting the backend to send a contiguous, non-reordered window.
    pub fn ingest(&mut self, snapshot: &[CallRecord]) -> usize {
        let mut added = 0;

        for record in snapshot.iter().rev() {
            if self.seen.insert(record.dedup_key()) {
                trace!("Queued call {}", record.display_code);
                self.queue.push_back(record.clone());
                added += 1;
            }
        }

        if added > 0 {
            debug!(
                "Ingested {} new call(s) from snapshot of {}, {} pending",
                added,
                snapshot.len(),
                self.queue.len()
            );
        }

        added
    }

    /// Take the next call to announce
    pub fn pop(&mut self) -> Option<CallRecord> {
        self.queue.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct calls seen this session
    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}
