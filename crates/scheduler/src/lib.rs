//! Cooperative, time-sliced work scheduler.
//!
//! A [`Scheduler`] drains a [`WorkQueue`] of non-preemptible units in bounded
//! quanta measured by a [`TimeSliceClock`], handing control back to its host
//! through an injected [`YieldPrimitive`] between quanta. Runs can be
//! interrupted (with a timed auto-resume) or stopped, and a
//! [`StatusReporter`] exposes state and run statistics to observers.
//!
//! Everything is single-threaded: the scheduler is `!Send` and relies on the
//! host loop for all concurrency.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod queue;
pub mod reporter;
pub mod runner;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock, TimeSliceClock};
pub use error::SchedulerError;
pub use events::{Listener, SchedulerEvent};
pub use host::{Continuation, HostLoop, YieldPrimitive};
pub use queue::WorkQueue;
pub use reporter::{RunStatistics, StatusReporter, StatusSnapshot};
pub use runner::{Scheduler, SchedulerBuilder};
pub use types::{SchedulerConfig, SchedulerState, UnitStatus, WorkUnit};
