//! Human-readable sizes, durations and transfer rates.

use std::time::Duration;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Formats a byte count with binary units, e.g. `1.50 MB`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Formats a duration as `5.0s`, `1m 05s` or `1h 01m 05s`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}.{}s", d.subsec_millis() / 100),
        (0, _) => format!("{minutes}m {seconds:02}s"),
        _ => format!("{hours}h {minutes:02}m {seconds:02}s"),
    }
}

/// Formats a duration as a zero-padded clock (`HH:MM:SS`).
#[must_use]
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Share of `total` reached by `done`, in percent. Zero when `total` is zero.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

/// Average rate in MiB/s over `elapsed`. Zero before any time has passed.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn mib_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / (1024.0 * 1024.0) / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_pick_the_largest_unit() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(10 * 1024 * 1024 * 1024), "10.00 GB");
        assert_eq!(format_bytes(3 * 1024u64.pow(4)), "3.00 TB");
        assert_eq!(format_bytes(2048 * 1024u64.pow(4)), "2048.00 TB");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::ZERO), "0.0s");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3605)), "1h 00m 05s");
    }

    #[test]
    fn clock_is_zero_padded() {
        assert_eq!(format_clock(Duration::ZERO), "00:00:00");
        assert_eq!(format_clock(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_clock(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn percent_of_empty_total() {
        assert!(percent(10, 0).abs() < f64::EPSILON);
        assert!((percent(1, 4) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_over_elapsed_time() {
        assert!(mib_per_sec(1024, Duration::ZERO).abs() < f64::EPSILON);
        assert!((mib_per_sec(5 * 1024 * 1024, Duration::from_secs(5)) - 1.0).abs() < f64::EPSILON);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bytes_never_panic(bytes in any::<u64>()) {
                let _ = format_bytes(bytes);
            }

            #[test]
            fn clock_has_three_fields(secs in 0u64..10_000_000) {
                prop_assert_eq!(format_clock(Duration::from_secs(secs)).split(':').count(), 3);
            }

            #[test]
            fn percent_stays_in_range(total in 1u64..u64::MAX, frac in 0.0f64..=1.0) {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
                let done = (total as f64 * frac) as u64;
                let p = percent(done.min(total), total);
                prop_assert!((0.0..=100.0).contains(&p));
            }
        }
    }
}
