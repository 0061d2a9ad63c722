//! FIFO queue of callers waiting for a session.
//!
//! Each waiter is a single-assignment `oneshot` slot keyed by a ticket.
//! Tickets increase monotonically, so the smallest key is always the
//! oldest waiter and cancelling by ticket needs no scan.

use std::collections::BTreeMap;

use tokio::sync::oneshot;

/// What a waiter's slot is filled with.
pub(crate) enum Delivery<S> {
    /// A live session, counted against `max_size`.
    Session(S),
    /// An uncounted, uninitialized handle issued once the pool is stopping.
    Placeholder(S),
}

pub(crate) type Ticket = u64;

pub(crate) struct WaiterQueue<S> {
    waiters: BTreeMap<Ticket, oneshot::Sender<Delivery<S>>>,
    next_ticket: Ticket,
}

impl<S> WaiterQueue<S> {
    pub(crate) fn new() -> Self {
        Self {
            waiters: BTreeMap::new(),
            next_ticket: 0,
        }
    }

    /// Enqueue a new waiter behind every existing one.
    pub(crate) fn push(&mut self) -> (Ticket, oneshot::Receiver<Delivery<S>>) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(ticket, tx);
        (ticket, rx)
    }

    /// Dequeue the oldest waiter.
    pub(crate) fn pop(&mut self) -> Option<oneshot::Sender<Delivery<S>>> {
        self.waiters.pop_first().map(|(_, tx)| tx)
    }

    /// Deregister a waiter. Returns `false` if it was already dequeued.
    pub(crate) fn remove(&mut self, ticket: Ticket) -> bool {
        self.waiters.remove(&ticket).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fulfil(tx: oneshot::Sender<Delivery<u32>>, value: u32) {
        assert!(tx.send(Delivery::Session(value)).is_ok());
    }

    fn received(rx: &mut oneshot::Receiver<Delivery<u32>>) -> Option<u32> {
        match rx.try_recv() {
            Ok(Delivery::Session(v)) => Some(v),
            _ => None,
        }
    }

    #[test]
    fn pops_in_submission_order() {
        let mut queue = WaiterQueue::new();
        let (_, mut a) = queue.push();
        let (_, mut b) = queue.push();
        let (_, mut c) = queue.push();

        fulfil(queue.pop().unwrap(), 1);
        fulfil(queue.pop().unwrap(), 2);
        fulfil(queue.pop().unwrap(), 3);

        assert_eq!(received(&mut a), Some(1));
        assert_eq!(received(&mut b), Some(2));
        assert_eq!(received(&mut c), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_waiter_is_skipped() {
        let mut queue = WaiterQueue::new();
        let (_, mut a) = queue.push();
        let (middle, _b) = queue.push();
        let (_, mut c) = queue.push();

        assert!(queue.remove(middle));
        assert_eq!(queue.len(), 2);

        fulfil(queue.pop().unwrap(), 1);
        fulfil(queue.pop().unwrap(), 2);
        assert_eq!(received(&mut a), Some(1));
        assert_eq!(received(&mut c), Some(2));
    }

    #[test]
    fn remove_after_pop_reports_missing() {
        let mut queue = WaiterQueue::<u32>::new();
        let (ticket, _rx) = queue.push();
        let _tx = queue.pop().unwrap();
        assert!(!queue.remove(ticket));
    }
}
