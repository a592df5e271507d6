use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::operation::{Operation, Priority, LOG_TARGET};

#[derive(Debug)]
struct Entry {
    priority: Priority,
    seq: u64,
    description: String,
    op: Box<dyn Operation>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap: higher priority first, then lower (earlier) sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct State {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    closed: bool,
}

/// The pending operations of one link, ordered by priority and then by arrival.
///
/// Shared between the link's worker thread and anything scheduling work for it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use roadlink::g4::OpQueryStats;
/// use roadlink::{OpQueue, Priority, RetryPolicy};
/// use roadlink_core::DropAddress;
/// use roadlink_testing::MockController;
///
/// let queue = OpQueue::new();
/// let controller = Arc::new(MockController::new("ctl_1", DropAddress(1)));
/// assert!(queue.push(OpQueryStats::operation(controller.clone(), RetryPolicy::Limited(3))));
/// // The same operation for the same controller is already pending.
/// assert!(!queue.push(OpQueryStats::operation(controller, RetryPolicy::Limited(3))));
///
/// let op = queue.next(Duration::from_millis(10)).unwrap();
/// assert_eq!(Priority::Poll, op.priority());
/// assert!(queue.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct OpQueue {
    state: Mutex<State>,
    ready: Condvar,
}

impl OpQueue {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// Queues `op`, returning `false` if the queue is closed or an operation with the same
    /// description is already pending.
    pub fn push(&self, op: Box<dyn Operation>) -> bool {
        self.try_push(op).is_ok()
    }

    /// Queues `op` like [`push`](Self::push), handing it back if it was refused.
    ///
    /// # Errors
    ///
    /// Returns the operation itself if the queue is closed or an operation with the same
    /// description is already pending.
    #[allow(unused_results)] // Whether a worker was waiting doesn't matter.
    pub fn try_push(&self, op: Box<dyn Operation>) -> Result<(), Box<dyn Operation>> {
        let description = op.description();
        let mut state = self.state.lock();
        if state.closed {
            debug!(target: LOG_TARGET, "Queue closed, refusing {}", description);
            return Err(op);
        }
        if state.heap.iter().any(|entry| entry.description == description) {
            debug!(target: LOG_TARGET, "{} already queued", description);
            return Err(op);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry {
            priority: op.priority(),
            seq,
            description,
            op,
        });
        self.ready.notify_one();
        Ok(())
    }

    /// Removes the highest priority operation, waiting up to `wait` for one to arrive.
    ///
    /// Returns `None` if the wait elapses or the queue is closed and empty.
    pub fn next(&self, wait: Duration) -> Option<Box<dyn Operation>> {
        let deadline = Instant::now() + wait;
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.heap.pop() {
                return Some(entry.op);
            }
            if state.closed || self.ready.wait_until(&mut state, deadline).timed_out() {
                return state.heap.pop().map(|entry| entry.op);
            }
        }
    }

    /// Refuses further operations and wakes any waiting worker.
    ///
    /// Operations already queued can still be taken.
    #[allow(unused_results)] // Number of woken workers doesn't matter.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Whether an operation with this description is pending.
    pub fn contains(&self, description: &str) -> bool {
        self.state.lock().heap.iter().any(|entry| entry.description == description)
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Whether no operations are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
