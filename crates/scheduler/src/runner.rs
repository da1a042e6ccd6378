use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock, TimeSliceClock};
use super::error::SchedulerError;
use super::events::{EventBus, SchedulerEvent};
use super::host::YieldPrimitive;
use super::queue::WorkQueue;
use super::types::{SchedulerConfig, SchedulerState, WorkUnit};

/// Fluent builder for a [`Scheduler`].
///
/// # Example
/// ```ignore
/// let clock = ManualClock::new();
/// let host = Rc::new(HostLoop::new(Rc::new(clock.clone())));
/// let scheduler = SchedulerBuilder::new(SchedulerConfig::default())
///     .yield_primitive(host.clone())
///     .clock(Rc::new(clock))
///     .seed(7)
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    host: Option<Rc<dyn YieldPrimitive>>,
    clock: Option<Rc<dyn Clock>>,
    seed: Option<u64>,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            host: None,
            clock: None,
            seed: None,
        }
    }

    /// Host loop capability used to yield between quanta. Required.
    pub fn yield_primitive(mut self, host: Rc<dyn YieldPrimitive>) -> Self {
        self.host = Some(host);
        self
    }

    /// Time source for slices and simulated work. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed for unit duration generation, for reproducible queues.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        let host = self.host.ok_or(SchedulerError::MissingYieldPrimitive)?;
        self.config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Rc::new(SystemClock::new()));
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        debug!(
            budget_ms = self.config.quantum_budget_ms,
            resume_delay_ms = self.config.resume_delay_ms,
            "scheduler built"
        );

        Ok(Scheduler {
            inner: Rc::new(Inner {
                core: RefCell::new(Core {
                    config: self.config,
                    queue: WorkQueue::new(),
                    state: SchedulerState::Idle,
                    slice: TimeSliceClock::new(Rc::clone(&clock)),
                    generation: 0,
                    interrupt_requested: false,
                    quantum: None,
                    in_flight: None,
                    deferred: None,
                    rng,
                }),
                events: EventBus::default(),
                host,
                clock,
            }),
        })
    }
}

/// Cooperative, time-sliced scheduler over a [`WorkQueue`].
///
/// Processes units in FIFO order inside bounded quanta and yields to the host
/// loop between them. A `Scheduler` is a cheap handle; clones drive the same
/// instance, and separately built instances share nothing.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

struct Inner {
    core: RefCell<Core>,
    events: EventBus,
    host: Rc<dyn YieldPrimitive>,
    clock: Rc<dyn Clock>,
}

struct Core {
    config: SchedulerConfig,
    queue: WorkQueue,
    state: SchedulerState,
    slice: TimeSliceClock,
    /// Bumped on every cancellation; continuations carrying an older value are dropped.
    generation: u64,
    /// Set by `interrupt()` during a quantum, honoured at its boundary.
    interrupt_requested: bool,
    quantum: Option<OpenQuantum>,
    /// Index and duration of the unit between `UnitStarted` and `UnitCompleted`.
    in_flight: Option<(usize, Duration)>,
    /// Control requested while a unit was in flight, applied once it completes.
    deferred: Option<Deferred>,
    rng: StdRng,
}

struct OpenQuantum {
    generation: u64,
    started_at: Duration,
    processed: usize,
}

enum Deferred {
    Stop,
    Replace(WorkQueue),
}

impl Core {
    fn transition(&mut self, to: SchedulerState, at: Duration, events: &mut Vec<SchedulerEvent>) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(?from, ?to, cursor = self.queue.cursor(), "scheduler transition");
        self.state = to;
        events.push(SchedulerEvent::StateChanged { from, to, at });
    }

    fn cancel_pending(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Emit `QuantumEnded` for the open quantum, if any.
    fn close_quantum(&mut self, at: Duration, events: &mut Vec<SchedulerEvent>) {
        if let Some(quantum) = self.quantum.take() {
            events.push(SchedulerEvent::QuantumEnded {
                started_at: quantum.started_at,
                ended_at: at,
                processed: quantum.processed,
            });
        }
    }

    fn install_queue(&mut self, queue: WorkQueue, at: Duration, events: &mut Vec<SchedulerEvent>) {
        self.close_quantum(at, events);
        self.cancel_pending();
        self.interrupt_requested = false;
        self.queue = queue;
        let total = self.queue.len();
        info!(total, "queue generated");
        events.push(SchedulerEvent::Generated { total });
        self.transition(SchedulerState::Idle, at, events);
    }

    fn halt(&mut self, at: Duration, events: &mut Vec<SchedulerEvent>) {
        self.close_quantum(at, events);
        self.cancel_pending();
        self.interrupt_requested = false;
        self.queue.mark_current_interrupted();
        info!(cursor = self.queue.cursor(), "scheduler stopped");
        self.transition(SchedulerState::Interrupted, at, events);
    }
}

#[derive(Debug, Clone, Copy)]
enum Wake {
    Tick,
    Resume,
}

enum Step {
    Started,
    Yield(u64),
    Interrupted { generation: u64, delay: Duration },
    Done,
}

impl Scheduler {
    // ── Queue management ────────────────────────────────────────────

    /// Replace the queue with `count` pending units of random duration.
    pub fn generate(&self, count: usize) {
        self.replace_queue(|core| {
            let range = core.config.unit_range_ms();
            WorkQueue::generate(count, range, &mut core.rng)
        });
    }

    /// Replace the queue with units of the given durations, in order.
    pub fn generate_from(&self, durations: impl IntoIterator<Item = Duration>) {
        let queue = WorkQueue::from_durations(durations);
        self.replace_queue(|_| queue);
    }

    /// Empty the queue.
    pub fn clear(&self) {
        self.replace_queue(|_| WorkQueue::new());
    }

    /// While a unit is in flight the replacement waits for it to complete.
    fn replace_queue(&self, build: impl FnOnce(&mut Core) -> WorkQueue) {
        let mut events = Vec::new();
        {
            let mut core = self.inner.core.borrow_mut();
            let queue = build(&mut core);
            if core.in_flight.is_some() {
                debug!(total = queue.len(), "queue replacement deferred until unit completes");
                core.deferred = Some(Deferred::Replace(queue));
                return;
            }
            core.install_queue(queue, self.inner.clock.now(), &mut events);
        }
        self.inner.events.emit(events);
    }

    // ── Control ─────────────────────────────────────────────────────

    /// Begin or resume processing. Runs the first quantum before returning.
    ///
    /// Valid from `Idle` and `Interrupted`; a no-op otherwise, including
    /// re-entrant calls from a subscriber while a quantum is running.
    pub fn start(&self) {
        let mut events = Vec::new();
        {
            let mut core = self.inner.core.borrow_mut();
            match core.state {
                SchedulerState::Idle | SchedulerState::Interrupted => {
                    core.cancel_pending();
                    core.interrupt_requested = false;
                    core.queue.reset_current();
                    info!(
                        total = core.queue.len(),
                        cursor = core.queue.cursor(),
                        "scheduler starting"
                    );
                    core.transition(SchedulerState::Running, self.inner.clock.now(), &mut events);
                }
                state => {
                    debug!(?state, "start ignored");
                    return;
                }
            }
        }
        self.inner.events.emit(events);
        self.run_quantum();
    }

    /// Cancel any pending continuation.
    ///
    /// An active run becomes `Interrupted` with no auto-resume; an
    /// interrupted run stays `Interrupted` but loses its pending resume.
    /// A unit in flight always completes before the stop applies.
    pub fn stop(&self) {
        let mut events = Vec::new();
        {
            let mut core = self.inner.core.borrow_mut();
            match core.state {
                state if state.is_active() => {
                    if core.in_flight.is_some() {
                        debug!("stop deferred until unit completes");
                        if !matches!(core.deferred, Some(Deferred::Replace(_))) {
                            core.deferred = Some(Deferred::Stop);
                        }
                        return;
                    }
                    core.halt(self.inner.clock.now(), &mut events);
                }
                SchedulerState::Interrupted => {
                    core.cancel_pending();
                    info!(cursor = core.queue.cursor(), "pending auto-resume cancelled");
                }
                state => {
                    debug!(?state, "stop ignored");
                    return;
                }
            }
        }
        self.inner.events.emit(events);
    }

    /// Pause an active run and auto-resume after the configured delay.
    ///
    /// Between quanta this takes effect immediately. Inside a quantum the
    /// current quantum finishes first. From `Idle`, `Completed`, or
    /// `Interrupted` it does nothing.
    pub fn interrupt(&self) {
        let mut events = Vec::new();
        let (generation, delay) = {
            let mut core = self.inner.core.borrow_mut();
            match core.state {
                SchedulerState::Running => {
                    debug!("interrupt requested, takes effect at quantum boundary");
                    core.interrupt_requested = true;
                    return;
                }
                SchedulerState::Yielding => {
                    let generation = core.cancel_pending();
                    core.queue.mark_current_interrupted();
                    info!(cursor = core.queue.cursor(), "scheduler interrupted");
                    core.transition(SchedulerState::Interrupted, self.inner.clock.now(), &mut events);
                    (generation, core.config.resume_delay())
                }
                state => {
                    debug!(?state, "interrupt ignored");
                    return;
                }
            }
        };
        self.inner.events.emit(events);
        self.schedule(delay, generation, Wake::Resume);
    }

    // ── Observation ─────────────────────────────────────────────────

    /// Register a listener for every [`SchedulerEvent`].
    ///
    /// Listeners run after the scheduler has released its state, so they may
    /// read from or call back into it.
    pub fn subscribe(&self, listener: impl FnMut(&SchedulerEvent) + 'static) {
        self.inner.events.subscribe(Box::new(listener));
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.core.borrow().state
    }

    pub fn cursor(&self) -> usize {
        self.inner.core.borrow().queue.cursor()
    }

    pub fn total(&self) -> usize {
        self.inner.core.borrow().queue.len()
    }

    pub fn unit_at(&self, index: usize) -> Option<WorkUnit> {
        self.inner.core.borrow().queue.unit_at(index).cloned()
    }

    /// Snapshot of every unit in queue order.
    pub fn units(&self) -> Vec<WorkUnit> {
        self.inner.core.borrow().queue.units().to_vec()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.core.borrow().config.clone()
    }

    /// Current time on the scheduler's clock.
    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    // ── Run loop ────────────────────────────────────────────────────

    fn schedule(&self, delay: Duration, generation: u64, wake: Wake) {
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        self.inner.host.schedule_continuation(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let scheduler = Scheduler { inner };
                    scheduler.wake(generation, wake);
                }
            }),
        );
    }

    fn wake(&self, generation: u64, wake: Wake) {
        let mut events = Vec::new();
        {
            let mut core = self.inner.core.borrow_mut();
            if core.generation != generation {
                trace!(?wake, generation, current = core.generation, "stale continuation dropped");
                return;
            }
            let now = self.inner.clock.now();
            match (wake, core.state) {
                (Wake::Tick, SchedulerState::Yielding) => {
                    core.transition(SchedulerState::Running, now, &mut events);
                }
                (Wake::Resume, SchedulerState::Interrupted) => {
                    core.queue.reset_current();
                    info!(cursor = core.queue.cursor(), "auto-resuming after interruption");
                    core.transition(SchedulerState::Running, now, &mut events);
                }
                (wake, state) => {
                    trace!(?wake, ?state, "continuation no longer applicable");
                    return;
                }
            }
        }
        self.inner.events.emit(events);
        self.run_quantum();
    }

    /// Execute one quantum: units back to back until the budget is spent,
    /// the queue drains, or a subscriber cancels the run between units.
    fn run_quantum(&self) {
        let generation = {
            let mut core = self.inner.core.borrow_mut();
            if core.state != SchedulerState::Running {
                return;
            }
            let generation = core.generation;
            let started_at = core.slice.begin_quantum();
            core.quantum = Some(OpenQuantum {
                generation,
                started_at,
                processed: 0,
            });
            generation
        };

        loop {
            let mut events = Vec::new();
            let step = {
                let mut core = self.inner.core.borrow_mut();
                Self::step(&mut core, generation, &mut events)
            };
            self.inner.events.emit(events);

            match step {
                Step::Started => self.finish_unit(),
                Step::Yield(generation) => {
                    self.schedule(Duration::ZERO, generation, Wake::Tick);
                    return;
                }
                Step::Interrupted { generation, delay } => {
                    self.schedule(delay, generation, Wake::Resume);
                    return;
                }
                Step::Done => return,
            }
        }
    }

    fn step(core: &mut Core, generation: u64, events: &mut Vec<SchedulerEvent>) -> Step {
        let now = core.slice.now();

        if core.generation != generation || core.state != SchedulerState::Running {
            debug!("quantum cancelled between units");
            if core.quantum.as_ref().is_some_and(|q| q.generation == generation) {
                core.close_quantum(now, events);
            }
            return Step::Done;
        }

        if core.queue.is_exhausted() {
            core.interrupt_requested = false;
            core.close_quantum(now, events);
            info!(processed = core.queue.len(), "run completed");
            core.transition(SchedulerState::Completed, now, events);
            return Step::Done;
        }

        let budget = core.config.quantum_budget();
        if core.slice.expired(budget) {
            debug!(
                processed = core.quantum.as_ref().map_or(0, |q| q.processed),
                elapsed_us = core.slice.elapsed().as_micros() as u64,
                cursor = core.queue.cursor(),
                "quantum exhausted"
            );
            core.close_quantum(now, events);
            if core.interrupt_requested {
                core.interrupt_requested = false;
                core.queue.mark_current_interrupted();
                info!(cursor = core.queue.cursor(), "scheduler interrupted");
                core.transition(SchedulerState::Interrupted, now, events);
                return Step::Interrupted {
                    generation: core.generation,
                    delay: core.config.resume_delay(),
                };
            }
            core.transition(SchedulerState::Yielding, now, events);
            return Step::Yield(core.generation);
        }

        let index = core.queue.cursor();
        let Some(duration) = core.queue.begin_current(now) else {
            core.close_quantum(now, events);
            return Step::Done;
        };
        core.in_flight = Some((index, duration));
        events.push(SchedulerEvent::UnitStarted { index, at: now });
        Step::Started
    }

    /// Run the in-flight unit to completion, then apply any control
    /// requested while it was running.
    fn finish_unit(&self) {
        let mut events = Vec::new();
        {
            let mut core = self.inner.core.borrow_mut();
            let Some((index, duration)) = core.in_flight.take() else {
                return;
            };

            core.slice.spend(duration);

            let done_at = core.slice.now();
            core.queue.complete_current(done_at);
            if let Some(quantum) = core.quantum.as_mut() {
                quantum.processed += 1;
            }
            trace!(index, duration_ms = duration.as_millis() as u64, "unit completed");
            events.push(SchedulerEvent::UnitCompleted {
                index,
                at: done_at,
                duration,
            });

            match core.deferred.take() {
                Some(Deferred::Stop) => core.halt(done_at, &mut events),
                Some(Deferred::Replace(queue)) => core.install_queue(queue, done_at, &mut events),
                None => {}
            }
        }
        self.inner.events.emit(events);
    }
}
