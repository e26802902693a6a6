use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{Poller, TickOutcome};

/// Run a check every `period` until `shutdown` resolves.
///
/// The first check runs immediately. A check that outlasts `period` delays the following ones instead of letting
/// them pile up. A check in progress when `shutdown` resolves is dropped.
pub async fn run<F>(poller: &Poller, period: Duration, shutdown: F)
where
    F: Future<Output = ()> + Send,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);

    info!(period_ms = period.as_millis() as u64, "Starting checks");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            outcome = poller.tick() => match outcome {
                TickOutcome::Completed(report) => {
                    debug!(findings = report.findings.len(), "Tick completed");
                }
                TickOutcome::Aborted => debug!("Tick aborted"),
                TickOutcome::Overlapped => debug!("Tick overlapped"),
            },
        }
    }

    info!("Shutting down");
}
