//! Reconnect delays.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

/// Delay before the first reconnect attempt.
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Doubling reconnect delay, capped, reset after a successful open.
#[derive(Debug)]
pub struct ReconnectBackoff {
    builder: ExponentialBuilder,
    current: ExponentialBackoff,
    max: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(INITIAL_RECONNECT_DELAY, MAX_RECONNECT_DELAY)
    }
}

impl ReconnectBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let builder = ExponentialBuilder::default()
            .with_min_delay(initial)
            .with_max_delay(max)
            .with_factor(2.0)
            .without_max_times();
        Self {
            builder,
            current: builder.build(),
            max,
        }
    }

    /// Returns the delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.current.next().unwrap_or(self.max)
    }

    /// Starts over from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.builder.build();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ReconnectBackoff;

    fn millis(backoff: &mut ReconnectBackoff, n: usize) -> Vec<u128> {
        (0..n).map(|_| backoff.next_delay().as_millis()).collect()
    }

    #[test]
    fn test_delays_double_up_to_cap() {
        let mut backoff = ReconnectBackoff::default();

        assert_eq!(
            millis(&mut backoff, 8),
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_reset_restarts_from_initial_delay() {
        let mut backoff = ReconnectBackoff::default();
        millis(&mut backoff, 4);

        backoff.reset();

        assert_eq!(millis(&mut backoff, 2), vec![1000, 2000]);
    }

    #[test]
    fn test_custom_bounds() {
        let mut backoff =
            ReconnectBackoff::new(Duration::from_millis(10), Duration::from_millis(25));

        assert_eq!(millis(&mut backoff, 3), vec![10, 20, 25]);
    }
}
