//! Time sources and the per-quantum slice timer.
//!
//! [`Clock`] abstracts the monotonic time source so the scheduler and host
//! loop can run against real time ([`SystemClock`]) or a virtual clock that
//! only moves when work is simulated ([`ManualClock`]).

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonic time source.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Occupy the current thread for `d`, the way real work would.
    fn spend(&self, d: Duration);

    /// Idle until `d` has passed.
    fn sleep(&self, d: Duration);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn spend(&self, d: Duration) {
        // Busy-wait: thread::sleep overshoots by more than a whole unit at 1ms granularity.
        let until = Instant::now() + d;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

/// Virtual clock that advances only through `spend`, `sleep`, or `advance`.
///
/// Clones share the same time, so a test can hand one clone to the scheduler
/// and another to the host loop.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn spend(&self, d: Duration) {
        self.advance(d);
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// Measures elapsed time within one quantum against a budget.
pub struct TimeSliceClock {
    clock: Rc<dyn Clock>,
    started: Option<Duration>,
}

impl TimeSliceClock {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self { clock, started: None }
    }

    /// Record the start of a new quantum and return its timestamp.
    pub fn begin_quantum(&mut self) -> Duration {
        let now = self.clock.now();
        self.started = Some(now);
        now
    }

    /// Time since the open quantum began, zero if none is open.
    pub fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => self.clock.now().saturating_sub(started),
            None => Duration::ZERO,
        }
    }

    /// Whether the open quantum has used up `budget`. With no open quantum
    /// there is nothing left to spend, so this reports expired.
    pub fn expired(&self, budget: Duration) -> bool {
        match self.started {
            Some(_) => self.elapsed() >= budget,
            None => true,
        }
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Simulate a unit of work on the underlying clock.
    pub fn spend(&self, d: Duration) {
        self.clock.spend(d);
    }
}
