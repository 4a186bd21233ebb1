//! Fixed reconnect backoff ladder shared by every feed adapter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default reconnect delays, in seconds. After the ladder is exhausted the
/// final delay repeats until the attempt is cancelled.
pub const DEFAULT_RETRY_DELAYS_SEC: [u64; 5] = [1, 2, 5, 10, 15];

/// Reconnect schedule: a fixed ladder of delays that holds at its last rung.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrySchedule {
    delays_sec: Vec<u64>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            delays_sec: DEFAULT_RETRY_DELAYS_SEC.to_vec(),
        }
    }
}

impl RetrySchedule {
    /// Construct from explicit second values. Empty input falls back to the
    /// default ladder.
    pub fn from_secs(delays_sec: &[u64]) -> Self {
        if delays_sec.is_empty() {
            Self::default()
        } else {
            Self {
                delays_sec: delays_sec.to_vec(),
            }
        }
    }

    /// Delay before the given zero-based reconnect attempt.
    pub fn delay(&self, attempt: usize) -> Duration {
        let index = attempt.min(self.delays_sec.len() - 1);
        Duration::from_secs(self.delays_sec[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_holds_at_fifteen() {
        let schedule = RetrySchedule::default();

        let expected = [1u64, 2, 5, 10, 15, 15, 15];
        for (attempt, want) in expected.into_iter().enumerate() {
            assert_eq!(
                schedule.delay(attempt),
                Duration::from_secs(want),
                "attempt {attempt} failed"
            );
        }
    }

    #[test]
    fn test_empty_override_falls_back_to_default() {
        assert_eq!(RetrySchedule::from_secs(&[]), RetrySchedule::default());
        assert_eq!(
            RetrySchedule::from_secs(&[3]).delay(10),
            Duration::from_secs(3)
        );
    }
}
