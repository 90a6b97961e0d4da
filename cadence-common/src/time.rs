//! Millisecond conversions for tick periods and latency figures

use std::time::Duration;

/// Tick period from a configured millisecond value
pub fn period(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Tick period for a timer that `0` switches off
pub fn optional_period(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| period(millis))
}

/// Fractional milliseconds, as reported in latency statistics
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables_optional_period() {
        assert_eq!(optional_period(0), None);
        assert_eq!(optional_period(250), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_period_keeps_zero() {
        // The consumer clamps zero periods itself
        assert_eq!(period(0), Duration::ZERO);
        assert_eq!(period(16), Duration::from_millis(16));
    }

    #[test]
    fn test_sub_millisecond_latency_is_fractional() {
        assert!((as_millis_f64(Duration::from_micros(1500)) - 1.5).abs() < 1e-9);
        assert!((as_millis_f64(Duration::from_nanos(250)) - 0.00025).abs() < 1e-12);
    }
}
