//! The yield primitive the scheduler hands control back through, and a
//! single-threaded host loop that implements it.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use crate::clock::Clock;

/// Deferred work handed to the host loop.
pub type Continuation = Box<dyn FnOnce()>;

/// Capability to run a continuation on a later turn of the host loop.
///
/// `delay == Duration::ZERO` means "next turn". Implementations may also run
/// the continuation inline; the scheduler never calls this while holding
/// its own state borrowed.
pub trait YieldPrimitive {
    fn schedule_continuation(&self, delay: Duration, continuation: Continuation);
}

impl<T: YieldPrimitive + ?Sized> YieldPrimitive for Rc<T> {
    fn schedule_continuation(&self, delay: Duration, continuation: Continuation) {
        (**self).schedule_continuation(delay, continuation)
    }
}

struct Scheduled {
    due: Duration,
    seq: u64,
    run: Continuation,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap pops the earliest due time, FIFO among ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Timer-ordered continuation loop on a shared [`Clock`].
///
/// Each turn pops the earliest due continuation, waits on the clock until it
/// is due, and runs it. With a [`ManualClock`](crate::ManualClock) the wait is
/// a clock advance, so runs are deterministic and instant.
pub struct HostLoop {
    clock: Rc<dyn Clock>,
    queue: RefCell<BinaryHeap<Scheduled>>,
    next_seq: Cell<u64>,
    turns: Cell<u64>,
}

impl HostLoop {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            queue: RefCell::new(BinaryHeap::new()),
            next_seq: Cell::new(0),
            turns: Cell::new(0),
        }
    }

    /// Number of continuations waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Number of turns executed so far.
    pub fn turns(&self) -> u64 {
        self.turns.get()
    }

    /// Run the earliest continuation. Returns `false` if none was pending.
    pub fn turn(&self) -> bool {
        // Pop before running: the continuation may schedule more work.
        let next = self.queue.borrow_mut().pop();
        let Some(next) = next else {
            return false;
        };

        let now = self.clock.now();
        if next.due > now {
            self.clock.sleep(next.due - now);
        }
        self.turns.set(self.turns.get() + 1);
        trace!(seq = next.seq, due_ms = next.due.as_millis() as u64, "host turn");
        (next.run)();
        true
    }

    /// Drain the loop. Returns the number of turns run.
    pub fn run(&self) -> u64 {
        let mut ran = 0;
        while self.turn() {
            ran += 1;
        }
        ran
    }

    /// Run turns until `done` holds or the loop drains. Returns whether `done` held.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) -> bool {
        loop {
            if done() {
                return true;
            }
            if !self.turn() {
                return done();
            }
        }
    }
}

impl YieldPrimitive for HostLoop {
    fn schedule_continuation(&self, delay: Duration, continuation: Continuation) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.queue.borrow_mut().push(Scheduled {
            due: self.clock.now() + delay,
            seq,
            run: continuation,
        });
    }
}
