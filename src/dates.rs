//! Date parsing for handwritten-form values. Forms arrive with every date
//! shape imaginable; comparisons and consistency checks all go through the
//! same ladder.

use chrono::NaiveDate;

/// Parse a date string, trying multiple formats.
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    // ISO first (the format prompts ask for).
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    let formats = [
        "%m/%d/%Y", // 01/15/2024
        "%m-%d-%Y", // 01-15-2024
        "%d/%m/%Y", // 15/01/2024
        "%Y/%m/%d", // 2024/01/15
        "%B %d, %Y", // January 15, 2024
        "%d %B %Y", // 15 January 2024
    ];

    for format in &formats {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    None
}

/// Canonical `YYYY-MM-DD` form, or `None` when the value doesn't parse.
pub fn canonicalize(date_str: &str) -> Option<String> {
    parse_date(date_str).map(|d| d.format("%Y-%m-%d").to_string())
}
