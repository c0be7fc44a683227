use std::{cmp::Ordering, collections::BinaryHeap};

use tokio::sync::oneshot;

/// A suspended acquirer: its priority, insertion order, and wake-up signal.
struct Waiter {
    priority: f64,
    seq: u64,
    signal: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Larger priority wins; earlier insertion wins within a priority.
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The queue of acquirers waiting for a slot.
///
/// Waiters are woken highest priority first, first-come-first-served among
/// equal priorities.
#[derive(Default)]
pub(super) struct WaiterQueue {
    heap: BinaryHeap<Waiter>,
    next_seq: u64,
}

impl WaiterQueue {
    pub(super) fn push(&mut self, priority: f64, signal: oneshot::Sender<()>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Waiter {
            priority,
            seq,
            signal,
        });
    }

    /// Wake the frontmost waiter, skipping any whose acquirer has gone away.
    ///
    /// Returns `false` if no live waiter was found.
    pub(super) fn wake_one(&mut self) -> bool {
        while let Some(waiter) = self.heap.pop() {
            if waiter.signal.send(()).is_ok() {
                return true;
            }
        }
        false
    }

    /// Wake every queued waiter.
    pub(super) fn wake_all(&mut self) {
        for waiter in self.heap.drain() {
            let _ = waiter.signal.send(());
        }
    }
}
