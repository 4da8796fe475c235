//! Utility functions and helpers.
//!
//! - [`paths`]: Path normalization and expansion
//! - [`thread_pool`]: Walk pool configuration

/// Path manipulation and resolution utilities
pub mod paths;
/// Thread pool configuration for parallel walks
pub mod thread_pool;

use std::time::Duration;

/// Formats a duration the way status output shows it, rounded to milliseconds.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let rounded = Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
    humantime::format_duration(rounded).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(20)), "20s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
        assert_eq!(format_duration(Duration::from_nanos(1_000_123)), "1ms");
    }
}
