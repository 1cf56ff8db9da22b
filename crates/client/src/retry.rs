//! Retrying fallible async operations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqcache_core::Error;
use tokio::time::Instant;

type ThrowError = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Limits for [`retry`]. At least one limit is always set; when both are,
/// whichever is reached first ends the loop.
#[derive(Clone)]
pub struct RetryOptions {
    max_retries: Option<u32>,
    max_duration: Option<Duration>,
    throw_error: ThrowError,
}

impl RetryOptions {
    /// Stop once `attempts` calls have failed.
    pub fn max_retries(attempts: u32) -> Self {
        Self { max_retries: Some(attempts), max_duration: None, throw_error: Arc::new(Error::is_cancelled) }
    }

    /// Stop once a failure happens `duration` or more after the first attempt started.
    pub fn max_duration(duration: Duration) -> Self {
        Self { max_retries: None, max_duration: Some(duration), throw_error: Arc::new(Error::is_cancelled) }
    }

    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = Some(attempts);
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Errors for which `throw_error` returns true are returned at once
    /// without retrying. The default matches [`Error::Cancelled`].
    pub fn with_throw_error(mut self, throw_error: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
        self.throw_error = Arc::new(throw_error);
        self
    }

    fn exhausted(&self, failures: u32, elapsed: Duration) -> bool {
        self.max_retries.is_some_and(|max| failures >= max) || self.max_duration.is_some_and(|max| elapsed >= max)
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("max_duration", &self.max_duration)
            .finish_non_exhaustive()
    }
}

/// Call `operation` until it succeeds or the limits in `options` are reached.
///
/// The operation always runs at least once. On exhaustion the last error is returned.
pub async fn retry<T, F, Fut>(mut operation: F, options: RetryOptions) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let started = Instant::now();
    let mut failures = 0u32;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if (options.throw_error)(&error) {
            return Err(error);
        }

        failures += 1;
        if options.exhausted(failures, started.elapsed()) {
            return Err(error);
        }
        tracing::debug!(attempt = failures, error = %error, "retrying after failure");
    }
}
