//! Broker quota throttling.
//!
//! Responses carry `throttle_time_ms`; a non-zero value asks the client to hold off the next request to that broker.

use std::time::Duration;

use tracing::warn;

use crate::backoff::ErrorOrThrottle;

/// Turn a broker throttle hint into [`ErrorOrThrottle::Throttle`].
///
/// Missing, zero and negative hints don't throttle.
pub fn maybe_throttle<E>(throttle_time_ms: Option<i32>) -> Result<(), ErrorOrThrottle<E>>
where
    E: Send,
{
    let Some(throttle_time_ms) = throttle_time_ms else {
        return Ok(());
    };

    match u64::try_from(throttle_time_ms) {
        Ok(0) => Ok(()),
        Ok(ms) => Err(ErrorOrThrottle::Throttle(Duration::from_millis(ms))),
        Err(_) => {
            warn!(throttle_time_ms, "Invalid throttle time");
            Ok(())
        }
    }
}
