use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Waiting for its turn in the queue.
    Pending,
    /// Currently executing. At most one unit is in this state at a time.
    Processing,
    /// Finished; `completed_at` is set.
    Completed,
    /// Next in line when the scheduler was interrupted.
    Interrupted,
}

/// Scheduler state machine.
///
/// `Idle → Running → {Yielding → Running | Completed | Interrupted}`,
/// `Interrupted → Running` by explicit start or auto-resume, and any state
/// back to `Idle` only through queue regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Queue generated (or empty), nothing started yet.
    Idle,
    /// Inside a quantum, executing units.
    Running,
    /// Between quanta; a continuation is pending on the host loop.
    Yielding,
    /// Paused with progress kept; may auto-resume after the configured delay.
    Interrupted,
    /// Every unit has been processed.
    Completed,
}

impl SchedulerState {
    /// Whether the scheduler is in the middle of a run (inside or between quanta).
    pub fn is_active(self) -> bool {
        matches!(self, SchedulerState::Running | SchedulerState::Yielding)
    }
}

/// One non-preemptible item of simulated work.
///
/// Timestamps are monotonic offsets from the scheduler clock's origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    /// Ordinal index in the queue.
    pub id: usize,
    pub status: UnitStatus,
    /// How long the unit occupies the thread when processed.
    pub estimated_duration: Duration,
    pub started_at: Option<Duration>,
    pub completed_at: Option<Duration>,
}

impl WorkUnit {
    pub fn new(id: usize, estimated_duration: Duration) -> Self {
        Self {
            id,
            status: UnitStatus::Pending,
            estimated_duration,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Time budget for one quantum, in milliseconds.
    #[serde(default = "default_quantum_budget")]
    pub quantum_budget_ms: u64,
    /// Host frame interval the budget has to fit inside, in milliseconds.
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    /// Delay before an interrupted run resumes on its own, in milliseconds.
    #[serde(default = "default_resume_delay")]
    pub resume_delay_ms: u64,
    /// Lower bound for generated unit durations (inclusive).
    #[serde(default = "default_min_unit")]
    pub min_unit_ms: u64,
    /// Upper bound for generated unit durations (inclusive).
    #[serde(default = "default_max_unit")]
    pub max_unit_ms: u64,
}

fn default_quantum_budget() -> u64 { 5 }
fn default_frame_interval() -> u64 { 16 }
fn default_resume_delay() -> u64 { 1000 }
fn default_min_unit() -> u64 { 1 }
fn default_max_unit() -> u64 { 10 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quantum_budget_ms: default_quantum_budget(),
            frame_interval_ms: default_frame_interval(),
            resume_delay_ms: default_resume_delay(),
            min_unit_ms: default_min_unit(),
            max_unit_ms: default_max_unit(),
        }
    }
}

impl SchedulerConfig {
    pub fn quantum_budget(&self) -> Duration {
        Duration::from_millis(self.quantum_budget_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    /// Inclusive millisecond range that generated unit durations are drawn from.
    pub fn unit_range_ms(&self) -> RangeInclusive<u64> {
        self.min_unit_ms..=self.max_unit_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.quantum_budget(), Duration::from_millis(5));
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
        assert_eq!(config.resume_delay(), Duration::from_secs(1));
        assert_eq!(config.unit_range_ms(), 1..=10);
    }

    #[test]
    fn budget_fits_inside_frame() {
        let config = SchedulerConfig::default();
        assert!(config.quantum_budget() < config.frame_interval());
    }

    #[test]
    fn active_states() {
        assert!(SchedulerState::Running.is_active());
        assert!(SchedulerState::Yielding.is_active());
        assert!(!SchedulerState::Idle.is_active());
        assert!(!SchedulerState::Interrupted.is_active());
        assert!(!SchedulerState::Completed.is_active());
    }

    #[test]
    fn new_unit_is_pending() {
        let unit = WorkUnit::new(3, Duration::from_millis(7));
        assert_eq!(unit.id, 3);
        assert_eq!(unit.status, UnitStatus::Pending);
        assert!(unit.started_at.is_none());
        assert!(unit.completed_at.is_none());
    }

    #[test]
    fn states_serialize_snake_case() {
        let json = serde_json::to_string(&SchedulerState::Yielding).unwrap();
        assert_eq!(json, "\"yielding\"");
    }
}
