use chrono::{DateTime, Local, TimeZone};

/// Wall-clock time of a message in the local timezone, e.g. `14:03:27`.
pub fn format_message_time(timestamp_ms: i64) -> String {
    format_time_in(timestamp_ms, &Local)
}

fn format_time_in<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(utc) if timestamp_ms > 0 => utc.with_timezone(tz).format("%H:%M:%S").to_string(),
        _ => "--:--:--".to_string(),
    }
}

/// Coarse distance between two epoch-millisecond instants, e.g. `3h ago`.
pub fn format_relative_date(timestamp_ms: i64, now_ms: i64) -> String {
    if now_ms <= 0 || timestamp_ms <= 0 {
        return "-".to_string();
    }
    let (timestamp, now) = (timestamp_ms / 1000, now_ms / 1000);
    let (delta, future) = if timestamp > now {
        (timestamp - now, true)
    } else {
        (now - timestamp, false)
    };
    if delta < 10 {
        return "now".to_string();
    }
    if delta < 60 {
        return format_relative_unit(delta, "s", future);
    }
    let minutes = delta / 60;
    if minutes < 60 {
        return format_relative_unit(minutes, "m", future);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format_relative_unit(hours, "h", future);
    }
    let days = hours / 24;
    if days < 7 {
        return format_relative_unit(days, "d", future);
    }
    let weeks = days / 7;
    if weeks < 4 {
        return format_relative_unit(weeks, "w", future);
    }
    let months = days / 30;
    if months < 12 {
        return format_relative_unit(months, "mo", future);
    }
    let years = days / 365;
    format_relative_unit(years, "y", future)
}

fn format_relative_unit(value: i64, unit: &str, future: bool) -> String {
    if future {
        format!("in {}{}", value, unit)
    } else {
        format!("{}{} ago", value, unit)
    }
}

pub fn current_epoch_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const NOW: i64 = 1_769_612_645_000; // 2026-01-28T15:04:05Z

    #[test]
    fn test_message_time() {
        assert_eq!(format_time_in(NOW, &Utc), "15:04:05");
        assert_eq!(format_time_in(0, &Utc), "--:--:--");
    }

    #[test]
    fn test_relative_past() {
        assert_eq!(format_relative_date(NOW - 5_000, NOW), "now");
        assert_eq!(format_relative_date(NOW - 45_000, NOW), "45s ago");
        assert_eq!(format_relative_date(NOW - 2 * 3_600_000, NOW), "2h ago");
        assert_eq!(format_relative_date(NOW - 3 * 86_400_000, NOW), "3d ago");
        assert_eq!(format_relative_date(NOW - 14 * 86_400_000, NOW), "2w ago");
    }

    #[test]
    fn test_relative_future_and_missing() {
        assert_eq!(format_relative_date(NOW + 120_000, NOW), "in 2m");
        assert_eq!(format_relative_date(0, NOW), "-");
    }
}
