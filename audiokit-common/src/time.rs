//! Timestamp utilities

use chrono::{DateTime, Local, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Local wall-clock tag used in generated artifact names (`YYYYmmdd_HHMMSS`)
pub fn filename_tag() -> String {
    format_filename_tag(Local::now())
}

/// Format a timestamp as a filename tag
pub fn format_filename_tag<Tz: chrono::TimeZone>(at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_now_successive_calls_advance() {
        let time1 = now();
        std::thread::sleep(Duration::from_millis(10));
        let time2 = now();
        assert!(time2 > time1);
    }

    #[test]
    fn test_format_filename_tag() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        assert_eq!(format_filename_tag(at), "20240309_070502");
    }

    #[test]
    fn test_filename_tag_is_filesystem_safe() {
        let tag = filename_tag();
        assert_eq!(tag.len(), 15);
        assert!(tag.chars().all(|c| c.is_ascii_digit() || c == '_'));
    }
}
