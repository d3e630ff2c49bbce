//! Reconnect backoff policy.

use std::time::Duration;

const INITIAL_DELAY_SECS: f64 = 1.0;
const MULTIPLIER: f64 = 1.5;
const MAX_DELAY_SECS: f64 = 30.0;

/// Exponential backoff: 1s, 1.5s, 2.25s, ... capped at 30s. The agent
/// never gives up; it is reset on every successful connection.
pub struct Backoff {
    delay_secs: f64,
}

impl Backoff {
    pub fn new() -> Self {
        Self { delay_secs: INITIAL_DELAY_SECS }
    }

    /// The delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_secs;
        self.delay_secs = (self.delay_secs * MULTIPLIER).min(MAX_DELAY_SECS);
        Duration::from_secs_f64(delay)
    }

    pub fn reset(&mut self) {
        self.delay_secs = INITIAL_DELAY_SECS;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_nondecreasing_and_capped() {
        let mut backoff = Backoff::new();
        let mut previous = Duration::ZERO;
        for _ in 0..50 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(30));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(30));
    }

    #[test]
    fn test_starts_at_one_second_and_resets() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_delay(), Duration::from_secs_f64(1.0));
        assert_eq!(backoff.next_delay(), Duration::from_secs_f64(1.5));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs_f64(1.0));
    }
}
