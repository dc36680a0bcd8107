// In: src/bridge/format.rs

//! The strings the bridge hands back to hosts.

use std::time::Duration;

/// Reported by `query_state` when no instance exists.
pub const MISSING: &str = "missing";
/// Reported by `get_running_time` when no instance exists.
pub const NOT_AVAILABLE: &str = "N/A";

/// Formats a running time as zero-padded `HH:MM:SS.`, keeping the trailing dot
/// hosts already parse. Hours are not wrapped at 24.
pub fn format_running_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    format!("{:0>2}:{:0>2}:{:0>2}.", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_running_time() {
        assert_eq!(format_running_time(Duration::ZERO), "00:00:00.");
        assert_eq!(format_running_time(Duration::from_millis(5_999)), "00:00:05.");
        assert_eq!(format_running_time(Duration::from_secs(3_723)), "01:02:03.");
        assert_eq!(format_running_time(Duration::from_secs(100 * 3600)), "100:00:00.");
    }
}
