//! Wall-clock helpers.

use chrono::Utc;

/// Current unix epoch time in milliseconds.
pub fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Current unix epoch time in whole seconds.
pub fn now_epoch_sec() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_epoch_ms_is_post_2020() {
        // 2020-01-01T00:00:00Z
        assert!(now_epoch_ms() > 1_577_836_800_000);
        assert!(now_epoch_sec() > 1_577_836_800);
    }
}
