mod cli;
mod config;
mod host;

use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use timeslice_scheduler::{
    SchedulerBuilder, SchedulerEvent, SchedulerState, StatusReporter, StatusSnapshot,
};

use crate::cli::CliArgs;
use crate::config::CliConfig;
use crate::host::TokioHost;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?
        .with_overrides(&args)?;

    // The scheduler is single-threaded (`Rc` all the way down), so it lives
    // on a LocalSet driven by the current-thread runtime.
    let local = tokio::task::LocalSet::new();
    let snapshot = local.run_until(run(config, &args)).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("failed to serialize status")?
        );
    } else {
        info!(
            state = ?snapshot.state,
            processed = snapshot.processed,
            total = snapshot.total,
            progress = snapshot.progress(),
            interruptions = snapshot.interruptions,
            yields = snapshot.yields,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "run finished"
        );
    }

    Ok(())
}

/// Generate and run one queue, returning the reporter's final snapshot.
///
/// Returns once the run completes, is stopped by `--stop-after-ms`, or the
/// process receives Ctrl-C.
async fn run(config: CliConfig, args: &CliArgs) -> Result<StatusSnapshot> {
    let mut builder =
        SchedulerBuilder::new(config.scheduler.clone()).yield_primitive(Rc::new(TokioHost));
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let scheduler = builder.build().context("failed to build scheduler")?;
    let reporter = StatusReporter::attach(&scheduler);

    scheduler.subscribe(|event| {
        if let SchedulerEvent::StateChanged { from, to, at } = event {
            info!(?from, ?to, at_ms = at.as_millis() as u64, "state changed");
        }
    });

    let settled = Rc::new(Notify::new());
    {
        let settled = Rc::clone(&settled);
        reporter.watch(move |snapshot| {
            if snapshot.state == SchedulerState::Completed {
                settled.notify_one();
            }
        });
    }

    for &after in &args.interrupt_after_ms {
        let scheduler = scheduler.clone();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(Duration::from_millis(after)).await;
            info!(after_ms = after, "interrupting run");
            scheduler.interrupt();
        });
    }

    if let Some(after) = args.stop_after_ms {
        let scheduler = scheduler.clone();
        let settled = Rc::clone(&settled);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(Duration::from_millis(after)).await;
            info!(after_ms = after, "stopping run");
            scheduler.stop();
            settled.notify_one();
        });
    }

    info!(
        units = config.units,
        budget_ms = config.scheduler.quantum_budget_ms,
        "starting run"
    );
    scheduler.generate(config.units);
    scheduler.start();

    tokio::select! {
        _ = settled.notified() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            warn!("ctrl-c received, stopping run");
            scheduler.stop();
        }
    }

    Ok(reporter.snapshot())
}
