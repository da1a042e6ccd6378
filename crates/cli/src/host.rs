use std::time::Duration;

use timeslice_scheduler::{Continuation, YieldPrimitive};

/// Yield primitive backed by the current tokio `LocalSet`.
///
/// Zero-delay continuations run after the runtime has polled everything else
/// that is ready (timers, signals); delayed ones sleep on the tokio timer.
/// Must be used from inside `LocalSet::run_until`.
pub struct TokioHost;

impl YieldPrimitive for TokioHost {
    fn schedule_continuation(&self, delay: Duration, continuation: Continuation) {
        tokio::task::spawn_local(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            continuation();
        });
    }
}
