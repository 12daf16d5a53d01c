//! Flexible timestamp parsing for query parameters (§4.3 history listing
//! `begin`/`end`), grounded on the original's `TimeOf` helper: tries a fixed
//! list of formats plus a relative `Nh-ago` shorthand.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{AlertError, Result};

/// Parse `s` against, in order: epoch seconds, `YYYYMMDD`,
/// `YYYYMMDD/HH:MM`, `YYYY-MM-DD`, `YYYY-MM-DD/HH:MM`, `YYYYMMDDHHMMSS`,
/// RFC3339, and the relative shorthand `Nh-ago` (e.g. `24h-ago`).
pub fn time_of(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AlertError::Validation("empty time string".to_string()));
    }

    if let Ok(epoch) = s.parse::<i64>() {
        return Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| AlertError::Validation(format!("out-of-range epoch seconds: {s}")));
    }

    if let Some(rest) = s.strip_suffix("h-ago") {
        if let Ok(hours) = rest.parse::<i64>() {
            return Ok(Utc::now() - Duration::hours(hours));
        }
    }

    const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y%m%d/%H:%M", "%Y-%m-%d/%H:%M", "%Y%m%d%H%M%S"];
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&parsed));
        }
    }

    const NAIVE_DATE_FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d"];
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(s, fmt) {
            let Some(midnight) = parsed.and_hms_opt(0, 0, 0) else {
                continue;
            };
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Ok(parsed.with_timezone(&Utc));
    }

    Err(AlertError::Validation(format!("unrecognized time format: {s}")))
}
