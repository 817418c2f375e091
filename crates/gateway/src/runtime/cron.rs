//! 5-field cron evaluator (min hour dom month dow), evaluated in UTC.

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};

/// Parse a cron field and check if a value matches.
fn cron_field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    // Handle */N (every N).
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    // Handle comma-separated values.
    for part in field.split(',') {
        // Handle range N-M.
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

/// Check if a UTC datetime matches a 5-field cron expression.
pub fn cron_matches(cron: &str, dt: &DateTime<Utc>) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    cron_field_matches(fields[0], dt.minute())
        && cron_field_matches(fields[1], dt.hour())
        && cron_field_matches(fields[2], dt.day())
        && cron_field_matches(fields[3], dt.month())
        && cron_field_matches(fields[4], dt.weekday().num_days_from_sunday())
}

/// Next occurrence strictly after `after`, scanning minute boundaries for up
/// to a year. `None` for expressions that never fire (or malformed ones).
pub fn next_after(cron: &str, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut cursor = after
        .duration_round(Duration::minutes(1))
        .ok()
        .map(|rounded| {
            if rounded > *after {
                rounded
            } else {
                rounded + Duration::minutes(1)
            }
        })?;
    // 366 days of minutes.
    for _ in 0..(366 * 24 * 60) {
        if cron_matches(cron, &cursor) {
            return Some(cursor);
        }
        cursor += Duration::minutes(1);
    }
    None
}
