use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct BackoffState {
    failures: u32,
    until: Option<Instant>,
}

/// Exponential skip window after queue failures
///
/// Nothing here sleeps: callers ask whether they are inside the window
/// and skip the attempt if so.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    state: Mutex<BackoffState>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            state: Mutex::new(BackoffState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BackoffState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_backing_off(&self) -> bool {
        self.state()
            .until
            .map_or(false, |until| Instant::now() < until)
    }

    /// Record a failure and return the new skip window, `base * 2^(failures - 1)` capped
    pub fn record_failure(&self) -> Duration {
        let mut state = self.state();
        state.failures = state.failures.saturating_add(1);
        let exp = (state.failures - 1).min(16);
        let delay = self.base.saturating_mul(1u32 << exp).min(self.max);
        state.until = Some(Instant::now() + delay);
        delay
    }

    pub fn reset(&self) {
        *self.state() = BackoffState::default();
    }

    pub fn failures(&self) -> u32 {
        self.state().failures
    }
}
