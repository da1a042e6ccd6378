//! Integration tests for the time-sliced scheduler.
//!
//! All runs use a `ManualClock` shared by the scheduler and the `HostLoop`,
//! so simulated work and auto-resume delays cost no real time and every
//! timestamp is exact.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use timeslice_scheduler::{
    Clock, HostLoop, ManualClock, Scheduler, SchedulerBuilder, SchedulerConfig, SchedulerEvent,
    SchedulerState, StatusReporter, SystemClock, UnitStatus,
};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

struct Rig {
    clock: ManualClock,
    host: Rc<HostLoop>,
    scheduler: Scheduler,
    reporter: StatusReporter,
}

fn rig_with(config: SchedulerConfig, seed: u64) -> Rig {
    let clock = ManualClock::new();
    let host = Rc::new(HostLoop::new(Rc::new(clock.clone())));
    let scheduler = SchedulerBuilder::new(config)
        .yield_primitive(host.clone())
        .clock(Rc::new(clock.clone()))
        .seed(seed)
        .build()
        .unwrap();
    let reporter = StatusReporter::attach(&scheduler);
    Rig {
        clock,
        host,
        scheduler,
        reporter,
    }
}

fn rig(seed: u64) -> Rig {
    rig_with(SchedulerConfig::default(), seed)
}

/// Record every event the scheduler emits.
fn record(scheduler: &Scheduler) -> Rc<RefCell<Vec<SchedulerEvent>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    scheduler.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    log
}

#[test]
fn any_size_runs_to_completion() {
    for n in [0usize, 1, 2, 7, 30, 64] {
        let r = rig(n as u64);
        r.scheduler.generate(n);
        r.scheduler.start();
        r.host.run();

        assert_eq!(r.scheduler.state(), SchedulerState::Completed, "n = {n}");
        assert_eq!(r.scheduler.cursor(), n);
        assert_eq!(r.reporter.processed(), n);
        assert!(r
            .scheduler
            .units()
            .iter()
            .all(|u| u.status == UnitStatus::Completed));
    }
}

#[test]
fn scenario_a_empty_queue_completes_immediately() {
    let r = rig(1);
    r.scheduler.generate(0);
    r.scheduler.start();

    assert_eq!(r.scheduler.state(), SchedulerState::Completed);
    assert_eq!(r.reporter.processed(), 0);
    assert_eq!(r.host.pending(), 0, "nothing scheduled on the host");
}

#[test]
fn scenario_b_thirty_units_need_several_yields() {
    let r = rig(2);
    r.scheduler.generate(30);
    r.scheduler.start();
    r.host.run();

    assert_eq!(r.scheduler.state(), SchedulerState::Completed);
    assert_eq!(r.reporter.processed(), 30);
    assert!(r.reporter.yields() > 1, "yields = {}", r.reporter.yields());
}

#[test]
fn scenario_c_interrupt_then_auto_resume() {
    let r = rig(3);
    let events = record(&r.scheduler);
    r.scheduler.generate(100);
    r.scheduler.start();
    r.scheduler.interrupt();

    assert_eq!(r.scheduler.state(), SchedulerState::Interrupted);
    let paused_at = r.scheduler.cursor();
    assert!(paused_at < 100);
    let interrupted_at = r.clock.now();

    r.host.run();
    assert_eq!(r.scheduler.state(), SchedulerState::Completed);
    assert_eq!(r.scheduler.cursor(), 100);
    assert_eq!(r.reporter.interruptions(), 1);

    let resumed_at = events
        .borrow()
        .iter()
        .find_map(|e| match e {
            SchedulerEvent::StateChanged {
                from: SchedulerState::Interrupted,
                to: SchedulerState::Running,
                at,
            } => Some(*at),
            _ => None,
        })
        .expect("auto-resume transition");
    assert_eq!(resumed_at - interrupted_at, r.scheduler.config().resume_delay());
}

#[test]
fn scenario_d_stop_cancels_pending_resume() {
    let r = rig(4);
    r.scheduler.generate(100);
    r.scheduler.start();
    r.scheduler.interrupt();
    let paused_at = r.scheduler.cursor();

    r.scheduler.stop();
    assert_eq!(r.scheduler.state(), SchedulerState::Interrupted);

    r.host.run();
    assert_eq!(r.scheduler.state(), SchedulerState::Interrupted);
    assert_eq!(r.scheduler.cursor(), paused_at, "no progress without explicit start");

    r.scheduler.start();
    r.host.run();
    assert_eq!(r.scheduler.state(), SchedulerState::Completed);
    assert_eq!(r.scheduler.cursor(), 100);
}

#[test]
fn interrupt_while_running_never_leaves_a_unit_processing() {
    for n in [1usize, 3, 12, 50] {
        let r = rig(n as u64 + 100);
        let handle = r.scheduler.clone();
        r.scheduler.subscribe(move |event| {
            if let SchedulerEvent::UnitStarted { index: 0, .. } = event {
                handle.interrupt();
            }
        });

        r.scheduler.generate(n);
        r.scheduler.start();

        let state = r.scheduler.state();
        if state == SchedulerState::Interrupted {
            let cursor = r.scheduler.cursor();
            assert!(cursor <= n);
            assert!(r
                .scheduler
                .units()
                .iter()
                .all(|u| u.status != UnitStatus::Processing));
            assert_eq!(
                r.scheduler.unit_at(cursor).map(|u| u.status),
                Some(UnitStatus::Interrupted)
            );
        } else {
            // The whole queue fit in the first quantum.
            assert_eq!(state, SchedulerState::Completed, "n = {n}");
        }

        r.host.run();
        assert_eq!(r.scheduler.state(), SchedulerState::Completed);
    }
}

#[test]
fn double_start_matches_single_start() {
    let once = rig(9);
    let twice = rig(9);
    for r in [&once, &twice] {
        r.scheduler.generate(40);
    }

    once.scheduler.start();
    twice.scheduler.start();
    twice.scheduler.start();

    assert_eq!(once.scheduler.state(), twice.scheduler.state());
    assert_eq!(once.scheduler.cursor(), twice.scheduler.cursor());
    assert_eq!(once.scheduler.units(), twice.scheduler.units());
    assert_eq!(once.host.pending(), twice.host.pending());
}

#[test]
fn completion_timestamps_follow_queue_order() {
    let r = rig(5);
    r.scheduler.generate(60);
    r.scheduler.start();
    r.scheduler.interrupt();
    r.host.run();

    let stamps: Vec<Duration> = r
        .scheduler
        .units()
        .iter()
        .map(|u| u.completed_at.expect("every unit completed"))
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn quanta_stay_within_budget_plus_longest_unit() {
    let r = rig(6);
    let events = record(&r.scheduler);
    r.scheduler.generate(200);
    r.scheduler.start();
    r.host.run();

    let bound = r.scheduler.config().quantum_budget()
        + r.scheduler.units().iter().map(|u| u.estimated_duration).max().unwrap();
    let quanta: Vec<(Duration, Duration)> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::QuantumEnded { started_at, ended_at, .. } => Some((*started_at, *ended_at)),
            _ => None,
        })
        .collect();

    assert!(quanta.len() > 1);
    for (start, end) in quanta {
        assert!(end - start <= bound, "quantum of {:?} exceeds {:?}", end - start, bound);
    }
}

#[test]
fn elapsed_sums_work_not_resume_delay() {
    let r = rig(7);
    r.scheduler.generate(25);
    r.scheduler.start();
    r.scheduler.interrupt();
    r.host.run();

    let work: Duration = r.scheduler.units().iter().map(|u| u.estimated_duration).sum();
    assert_eq!(r.reporter.elapsed(), work);
    assert!(r.clock.now() >= work + r.scheduler.config().resume_delay());
}

#[test]
fn schedulers_on_one_host_do_not_interfere() {
    let clock = ManualClock::new();
    let host = Rc::new(HostLoop::new(Rc::new(clock.clone())));
    let build = |seed| {
        SchedulerBuilder::new(SchedulerConfig::default())
            .yield_primitive(host.clone())
            .clock(Rc::new(clock.clone()))
            .seed(seed)
            .build()
            .unwrap()
    };
    let a = build(1);
    let b = build(2);

    a.generate(20);
    b.generate(20);
    a.start();
    b.start();
    a.stop();

    host.run();
    assert_eq!(a.state(), SchedulerState::Interrupted);
    assert_eq!(b.state(), SchedulerState::Completed);
    assert_eq!(b.cursor(), 20);
    assert!(a.cursor() < 20);
}

#[test]
fn scheduler_is_reusable_across_generations() {
    let r = rig(8);
    r.scheduler.generate(10);
    r.scheduler.start();
    r.host.run();
    assert_eq!(r.scheduler.state(), SchedulerState::Completed);

    r.scheduler.generate(15);
    assert_eq!(r.scheduler.state(), SchedulerState::Idle);
    assert_eq!(r.reporter.processed(), 0);

    r.scheduler.start();
    r.host.run();
    assert_eq!(r.scheduler.cursor(), 15);
    assert_eq!(r.reporter.processed(), 15);
}

#[test]
fn custom_budget_changes_slice_size() {
    let config = SchedulerConfig {
        quantum_budget_ms: 12,
        ..SchedulerConfig::default()
    };
    let r = rig_with(config, 0);
    r.scheduler.generate_from([ms(3); 8]);
    r.scheduler.start();

    assert_eq!(r.scheduler.cursor(), 4, "four 3ms units fill a 12ms budget");
    assert_eq!(r.scheduler.state(), SchedulerState::Yielding);
}

#[test]
fn real_clock_run_completes() {
    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());
    let host = Rc::new(HostLoop::new(Rc::clone(&clock)));
    let config = SchedulerConfig {
        min_unit_ms: 1,
        max_unit_ms: 2,
        ..SchedulerConfig::default()
    };
    let scheduler = SchedulerBuilder::new(config)
        .yield_primitive(host.clone())
        .clock(clock)
        .build()
        .unwrap();
    let reporter = StatusReporter::attach(&scheduler);

    scheduler.generate(12);
    scheduler.start();
    host.run();

    assert_eq!(scheduler.state(), SchedulerState::Completed);
    assert_eq!(reporter.processed(), 12);
    assert!(reporter.elapsed() >= ms(12));
}
