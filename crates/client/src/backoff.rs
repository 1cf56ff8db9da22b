//! Spacing out repeated calls of an operation.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default)]
struct State {
    last_start: Option<Instant>,
    last_wait: Option<Duration>,
}

/// Delays every call after the first by a wait time derived from the previous call.
///
/// `wait_for(last_wait, last_runtime)` receives the previous wait (none before
/// the first wait) and the time since the previous call started. Failed calls
/// count like successful ones, so the call after a failure waits too.
pub struct Backoff<W> {
    wait_for: W,
    state: Mutex<State>,
}

impl<W> Backoff<W>
where
    W: Fn(Option<Duration>, Duration) -> Duration,
{
    pub fn new(wait_for: W) -> Self {
        Self { wait_for, state: Mutex::default() }
    }

    pub async fn run<T, F, Fut>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let wait = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let wait = state.last_start.map(|started| (self.wait_for)(state.last_wait, started.elapsed()));
            if wait.is_some() {
                state.last_wait = wait;
            }
            wait
        };

        if let Some(wait) = wait {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "backing off");
            tokio::time::sleep(wait).await;
        }

        self.state.lock().unwrap_or_else(PoisonError::into_inner).last_start = Some(Instant::now());
        operation().await
    }
}

impl Backoff<fn(Option<Duration>, Duration) -> Duration> {
    /// Wait `base` the first time, then double the previous wait up to `max`.
    pub fn exponential(base: Duration, max: Duration) -> Backoff<impl Fn(Option<Duration>, Duration) -> Duration> {
        Backoff::new(move |last: Option<Duration>, _| last.map_or(base, |last| last.saturating_mul(2)).min(max))
    }
}
