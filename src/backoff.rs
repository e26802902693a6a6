use std::ops::ControlFlow;
use std::time::Duration;

use rand::prelude::*;
use thiserror::Error;
use tracing::info;

/// Exponential backoff with jitter.
///
/// See <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>
#[derive(Debug, Clone)]
#[allow(missing_copy_implementations)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,
    pub deadline: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            base: 3.,
            deadline: None,
        }
    }
}

#[derive(Debug, Error)]
#[allow(missing_copy_implementations)]
pub enum BackoffError {
    #[error("Retry exceeded deadline. Source: {source}")]
    DeadlineExceeded {
        deadline: Duration,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type BackoffResult<T> = Result<T, BackoffError>;

/// Error (which should increase backoff) or throttle for a specific duration (as asked for by the broker).
#[derive(Debug)]
pub enum ErrorOrThrottle<E>
where
    E: Send,
{
    Error(E),
    Throttle(Duration),
}

/// [`Backoff`] can be created from a [`BackoffConfig`]
///
/// Consecutive calls to [`Backoff::next`] will return the next backoff interval
pub struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    total: f64,
    deadline: Option<f64>,
    rng: Option<Box<dyn RngCore + Sync + Send>>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("init_backoff", &self.init_backoff)
            .field("next_backoff_secs", &self.next_backoff_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("base", &self.base)
            .field("total", &self.total)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Backoff {
    /// Create a new [`Backoff`] from the provided [`BackoffConfig`]
    pub fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    /// Creates a new `Backoff` with the optional `rng`
    ///
    /// Uses [`rand::thread_rng()`] if no rng provided
    pub fn new_with_rng(
        config: &BackoffConfig,
        rng: Option<Box<dyn RngCore + Sync + Send>>,
    ) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            total: 0.0,
            deadline: config.deadline.map(|d| d.as_secs_f64()),
            rng,
        }
    }

    /// Returns the next backoff duration to wait for
    fn next(&mut self) -> Duration {
        let range = self.init_backoff..(self.next_backoff_secs * self.base);

        let rand_backoff = if range.is_empty() {
            // base <= 1 or a zero initial backoff
            self.init_backoff
        } else {
            match self.rng.as_mut() {
                Some(rng) => rng.gen_range(range),
                None => thread_rng().gen_range(range),
            }
        };

        let next_backoff = self.max_backoff_secs.min(rand_backoff);
        Duration::from_secs_f64(std::mem::replace(&mut self.next_backoff_secs, next_backoff))
    }

    /// Perform an async operation that retries with a backoff
    ///
    /// `do_stuff` breaks with the final result or continues with an error (which backs off) or a throttle request
    /// (which sleeps for exactly the requested duration).
    pub async fn retry_with_backoff<F, F1, B, E>(
        &mut self,
        request_name: &str,
        do_stuff: F,
    ) -> BackoffResult<B>
    where
        F: (Fn() -> F1) + Send + Sync,
        F1: std::future::Future<Output = ControlFlow<B, ErrorOrThrottle<E>>> + Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        loop {
            let e = match do_stuff().await {
                ControlFlow::Break(r) => break Ok(r),
                ControlFlow::Continue(ErrorOrThrottle::Error(e)) => e,
                ControlFlow::Continue(ErrorOrThrottle::Throttle(throttle)) => {
                    info!(
                        request_name,
                        throttle_secs = throttle.as_secs_f64(),
                        "broker asked us to throttle",
                    );
                    tokio::time::sleep(throttle).await;
                    continue;
                }
            };

            let backoff = self.next();
            self.total += backoff.as_secs_f64();

            if let Some(deadline) = self.deadline {
                if self.total > deadline {
                    break Err(BackoffError::DeadlineExceeded {
                        deadline: Duration::from_secs_f64(deadline),
                        source: Box::new(e),
                    });
                }
            }

            info!(
                e=%e,
                request_name,
                backoff_secs = backoff.as_secs_f64(),
                "request encountered non-fatal error - backing off",
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use rand::rngs::mock::StepRng;

    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_backoff() {
        let init_backoff_secs = 1.;
        let max_backoff_secs = 500.;
        let base = 3.;

        let config = BackoffConfig {
            init_backoff: Duration::from_secs_f64(init_backoff_secs),
            max_backoff: Duration::from_secs_f64(max_backoff_secs),
            deadline: None,
            base,
        };

        let assert_fuzzy_eq = |a: f64, b: f64| assert!((b - a).abs() < 0.0001, "{a} != {b}");

        // Create a static rng that takes the minimum of the range
        let rng = Box::new(StepRng::new(0, 0));
        let mut backoff = Backoff::new_with_rng(&config, Some(rng));

        for _ in 0..20 {
            assert_eq!(backoff.next().as_secs_f64(), init_backoff_secs);
        }

        // Create a static rng that takes the maximum of the range
        let rng = Box::new(StepRng::new(u64::MAX, 0));
        let mut backoff = Backoff::new_with_rng(&config, Some(rng));

        for i in 0..20 {
            let value = (base.powi(i) * init_backoff_secs).min(max_backoff_secs);
            assert_fuzzy_eq(backoff.next().as_secs_f64(), value);
        }
    }

    #[test]
    fn test_backoff_without_growth() {
        let config = BackoffConfig {
            base: 1.,
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);

        for _ in 0..5 {
            assert_eq!(backoff.next(), config.init_backoff);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let config = BackoffConfig {
            deadline: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let calls = AtomicUsize::new(0);

        let res: BackoffResult<()> = Backoff::new(&config)
            .retry_with_backoff("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(ErrorOrThrottle::Error(Boom))
            })
            .await;

        assert_matches!(res, Err(BackoffError::DeadlineExceeded { .. }));
        assert!(calls.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_does_not_count_towards_deadline() {
        let config = BackoffConfig {
            deadline: Some(Duration::from_millis(1)),
            ..Default::default()
        };
        let calls = AtomicUsize::new(0);

        let res = Backoff::new(&config)
            .retry_with_backoff("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    ControlFlow::Continue(ErrorOrThrottle::<Boom>::Throttle(Duration::from_secs(
                        10,
                    )))
                } else {
                    ControlFlow::Break(42)
                }
            })
            .await;

        assert_eq!(res.unwrap(), 42);
    }
}
