//! Idle sessions ordered by keep-alive deadline.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::time::Instant;

/// An idle session and the instant its idle lifetime runs out.
pub(crate) struct IdleEntry<S> {
    pub(crate) deadline: Instant,
    seq: u64,
    pub(crate) session: S,
}

// `BinaryHeap` is a max-heap: invert the comparison so the earliest
// deadline sits on top. `seq` breaks ties in insertion order.
impl<S> Ord for IdleEntry<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<S> PartialOrd for IdleEntry<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S> PartialEq for IdleEntry<S> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<S> Eq for IdleEntry<S> {}

/// Min-heap of idle sessions keyed by deadline.
pub(crate) struct IdlePool<S> {
    heap: BinaryHeap<IdleEntry<S>>,
    next_seq: u64,
}

impl<S> IdlePool<S> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, session: S, deadline: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(IdleEntry {
            deadline,
            seq,
            session,
        });
    }

    /// Put back an entry taken with [`pop`](Self::pop), keeping its deadline and position.
    pub(crate) fn requeue(&mut self, entry: IdleEntry<S>) {
        self.heap.push(entry);
    }

    /// Remove the entry with the earliest deadline.
    pub(crate) fn pop(&mut self) -> Option<IdleEntry<S>> {
        self.heap.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<S> {
        self.heap.drain().map(|entry| entry.session).collect()
    }
}
