//! Epoch-millisecond timestamps for index rows and event records

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    epoch_ms(SystemTime::now())
}

/// Convert a `SystemTime` to epoch milliseconds; times before the epoch
/// clamp to zero
pub fn epoch_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_epoch_ms_roundtrip() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(epoch_ms(t), 1_700_000_000_123);
    }

    #[test]
    fn test_pre_epoch_clamps_to_zero() {
        let t = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(epoch_ms(t), 0);
    }

    #[test]
    fn test_now_is_recent() {
        // 2024-01-01 in epoch millis
        assert!(now_ms() > 1_704_067_200_000);
    }
}
