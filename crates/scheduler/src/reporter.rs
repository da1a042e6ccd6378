//! Read-only status and run statistics derived from scheduler events.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::SchedulerEvent;
use crate::runner::Scheduler;
use crate::types::SchedulerState;

/// Counters for the current run. Reset whenever the queue is regenerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    /// Units completed.
    pub processed: usize,
    /// Transitions into `Interrupted`, whether by interrupt or stop.
    pub interruptions: u64,
    /// Transitions into `Yielding`.
    pub yields: u64,
    /// Cumulative wall-clock time spent inside quanta.
    pub elapsed: Duration,
}

/// Point-in-time status exposed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: SchedulerState,
    pub processed: usize,
    pub total: usize,
    /// Index of the next unit to process.
    pub cursor: usize,
    pub interruptions: u64,
    pub yields: u64,
    pub elapsed: Duration,
    /// Wall-clock time of the last applied event.
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    fn new(state: SchedulerState, total: usize, cursor: usize) -> Self {
        Self {
            state,
            processed: cursor,
            total,
            cursor,
            interruptions: 0,
            yields: 0,
            elapsed: Duration::ZERO,
            updated_at: None,
        }
    }

    pub fn statistics(&self) -> RunStatistics {
        RunStatistics {
            processed: self.processed,
            interruptions: self.interruptions,
            yields: self.yields,
            elapsed: self.elapsed,
        }
    }

    /// Fraction of the queue processed (1.0 for an empty queue).
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    /// Fold one event into the snapshot.
    pub fn apply(&mut self, event: &SchedulerEvent) {
        match *event {
            SchedulerEvent::Generated { total } => {
                *self = Self::new(self.state, total, 0);
            }
            SchedulerEvent::StateChanged { to, .. } => {
                self.state = to;
                match to {
                    SchedulerState::Interrupted => self.interruptions += 1,
                    SchedulerState::Yielding => self.yields += 1,
                    _ => {}
                }
            }
            SchedulerEvent::UnitStarted { .. } => {}
            SchedulerEvent::UnitCompleted { index, .. } => {
                self.processed += 1;
                self.cursor = index + 1;
            }
            SchedulerEvent::QuantumEnded {
                started_at,
                ended_at,
                ..
            } => {
                self.elapsed += ended_at.saturating_sub(started_at);
            }
        }
        self.updated_at = Some(Utc::now());
    }
}

type Watcher = Box<dyn FnMut(&StatusSnapshot)>;

struct Shared {
    snapshot: StatusSnapshot,
    watchers: Vec<Watcher>,
}

/// Observes a [`Scheduler`] and exposes its state and run statistics.
///
/// Holds only a subscription; it never mutates the scheduler. Because all
/// work runs on one thread, any read made after a transition sees it.
#[derive(Clone)]
pub struct StatusReporter {
    shared: Rc<RefCell<Shared>>,
}

impl StatusReporter {
    /// Subscribe to `scheduler`, seeding the snapshot from its current state.
    pub fn attach(scheduler: &Scheduler) -> Self {
        let snapshot = StatusSnapshot::new(scheduler.state(), scheduler.total(), scheduler.cursor());
        let shared = Rc::new(RefCell::new(Shared {
            snapshot,
            watchers: Vec::new(),
        }));

        let sink = Rc::clone(&shared);
        scheduler.subscribe(move |event| Self::on_event(&sink, event));

        Self { shared }
    }

    fn on_event(shared: &Rc<RefCell<Shared>>, event: &SchedulerEvent) {
        let (snapshot, mut watchers) = {
            let mut guard = shared.borrow_mut();
            guard.snapshot.apply(event);
            (guard.snapshot.clone(), std::mem::take(&mut guard.watchers))
        };

        for watcher in watchers.iter_mut() {
            watcher(&snapshot);
        }

        let mut guard = shared.borrow_mut();
        watchers.append(&mut guard.watchers);
        guard.watchers = watchers;
    }

    /// Call `watcher` with a fresh snapshot after every scheduler event.
    pub fn watch(&self, watcher: impl FnMut(&StatusSnapshot) + 'static) {
        self.shared.borrow_mut().watchers.push(Box::new(watcher));
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.shared.borrow().snapshot.clone()
    }

    pub fn statistics(&self) -> RunStatistics {
        self.shared.borrow().snapshot.statistics()
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.borrow().snapshot.state
    }

    pub fn processed(&self) -> usize {
        self.shared.borrow().snapshot.processed
    }

    pub fn total(&self) -> usize {
        self.shared.borrow().snapshot.total
    }

    pub fn interruptions(&self) -> u64 {
        self.shared.borrow().snapshot.interruptions
    }

    pub fn yields(&self) -> u64 {
        self.shared.borrow().snapshot.yields
    }

    pub fn elapsed(&self) -> Duration {
        self.shared.borrow().snapshot.elapsed
    }
}
