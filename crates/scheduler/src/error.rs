use thiserror::Error;

/// Errors raised while constructing or configuring a [`Scheduler`](crate::Scheduler).
///
/// Nothing in the run loop itself is fallible: once a scheduler is built,
/// misuse such as interrupting an idle queue is a logged no-op.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no yield primitive supplied: the scheduler cannot hand control back to a host loop")]
    MissingYieldPrimitive,

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
