use clap::Parser;

/// Drive the time-sliced scheduler on a single-threaded host loop.
///
/// Generates a queue of simulated work units, runs it in bounded quanta,
/// optionally interrupts or stops it on a timer, and prints the final
/// run statistics.
#[derive(Parser, Debug)]
#[command(name = "timeslice", version, about)]
pub struct CliArgs {
    /// Path to config file (default: ~/.config/timeslice/config.toml)
    #[arg(long, env = "TIMESLICE_CONFIG")]
    pub config: Option<String>,

    /// Number of work units to generate (overrides config)
    #[arg(long)]
    pub units: Option<usize>,

    /// Quantum budget in milliseconds (overrides config)
    #[arg(long)]
    pub budget_ms: Option<u64>,

    /// Auto-resume delay after an interrupt, in milliseconds (overrides config)
    #[arg(long)]
    pub resume_delay_ms: Option<u64>,

    /// Interrupt the run this many milliseconds after start (repeatable)
    #[arg(long)]
    pub interrupt_after_ms: Vec<u64>,

    /// Stop the run this many milliseconds after start
    #[arg(long)]
    pub stop_after_ms: Option<u64>,

    /// Seed for unit durations, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the final status as JSON
    #[arg(long)]
    pub json: bool,
}
