use crate::types::constants::{DEFAULT_RECONNECT_FALLBACK, RECONNECT_INTERVALS};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Maps an attempt count to the delay before the next attempt.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Retry delay source shared by socket reconnection and channel rejoin.
///
/// `next_delay` returns the delay for the current attempt and advances the
/// counter, so the delay before the `(k+1)`-th attempt is `f(k)`.
pub struct BackoffTimer {
    attempts: u32,
    after: DelayFn,
}

impl BackoffTimer {
    pub fn new(after: DelayFn) -> Self {
        Self { attempts: 0, after }
    }

    /// Stepped backoff from an interval table; the last entry repeats.
    pub fn from_table(intervals: &[u64]) -> Self {
        let table = intervals.to_vec();
        Self::new(Arc::new(move |attempt| {
            let millis = table.get(attempt as usize).copied().unwrap_or_else(|| {
                table.last().copied().unwrap_or(DEFAULT_RECONNECT_FALLBACK)
            });
            Duration::from_millis(millis)
        }))
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = (self.after)(self.attempts);
        self.attempts += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sleep for the next delay.
    pub async fn schedule_timeout(&mut self) {
        let delay = self.next_delay();
        sleep(delay).await;
    }
}

impl Default for BackoffTimer {
    fn default() -> Self {
        Self::from_table(&RECONNECT_INTERVALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_steps_then_plateaus() {
        let mut timer = BackoffTimer::default();
        let delays: Vec<u64> = (0..6).map(|_| timer.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, [1_000, 2_000, 5_000, 10_000, 10_000, 10_000]);
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut timer = BackoffTimer::from_table(&[100, 200]);
        timer.next_delay();
        timer.next_delay();
        timer.reset();
        assert_eq!(timer.attempts(), 0);
        assert_eq!(timer.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn custom_delay_fn_receives_the_attempt_count() {
        let mut timer = BackoffTimer::new(Arc::new(|attempt| {
            Duration::from_millis(u64::from(attempt) * 10)
        }));
        assert_eq!(timer.next_delay(), Duration::from_millis(0));
        assert_eq!(timer.next_delay(), Duration::from_millis(10));
        assert_eq!(timer.next_delay(), Duration::from_millis(20));
    }
}
