//! General time utility functions

use chrono;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Longest duration produced by `seconds_to_duration`, small enough to be added to an `Instant`.
pub const MAX_DURATION: std::time::Duration = std::time::Duration::from_secs(u32::MAX as u64);

/// Convert a number of seconds into a `std::time::Duration`, clamping negative and non-finite
/// values to zero and anything longer than `MAX_DURATION` to `MAX_DURATION`.
pub fn seconds_to_duration(seconds: f64) -> std::time::Duration {
    if seconds.is_finite() && seconds > 0.0 {
        std::time::Duration::try_from_secs_f64(seconds)
            .unwrap_or(MAX_DURATION)
            .min(MAX_DURATION)
    }
    else {
        std::time::Duration::from_secs(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(
            duration_to_seconds(chrono::Duration::milliseconds(1500)),
            Some(1.5)
        );
        assert_eq!(seconds_to_duration(0.25).as_millis(), 250);
        assert_eq!(seconds_to_duration(-1.0).as_millis(), 0);
        assert_eq!(seconds_to_duration(f64::NAN).as_millis(), 0);
    }

    #[test]
    fn test_seconds_to_duration_saturates() {
        assert_eq!(seconds_to_duration(1e20), MAX_DURATION);
        assert_eq!(seconds_to_duration(f64::MAX), MAX_DURATION);
        assert_eq!(seconds_to_duration(f64::INFINITY).as_millis(), 0);

        // Still usable as a deadline
        assert!(std::time::Instant::now().checked_add(seconds_to_duration(1e20)).is_some());
    }
}
