//! Shared helpers: covering-period date math and artifact naming.
//!
//! Disposition documents always cover "yesterday" in UTC+8. The offset is
//! fixed — the host timezone must never leak into captions or filenames, so
//! every function here takes an explicit `now` instant.

use chrono::{DateTime, FixedOffset, Utc};

/// The fixed UTC+8 offset all covering-period math runs in.
pub fn reporting_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("+08:00 is a valid offset")
}

/// Preformatted calendar fields for a covering period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodDate {
    /// Zero-padded day of month, e.g. `"07"`.
    pub day: String,
    /// Full English month name, e.g. `"August"`.
    pub month: String,
    /// Four-digit year.
    pub year: String,
}

/// Compute the covering-period date: the calendar day before `now`, in UTC+8.
pub fn covering_period(now: DateTime<Utc>) -> PeriodDate {
    let local = now.with_timezone(&reporting_offset());
    let yesterday = local - chrono::Duration::days(1);
    PeriodDate {
        day: yesterday.format("%d").to_string(),
        month: yesterday.format("%B").to_string(),
        year: yesterday.format("%Y").to_string(),
    }
}

/// Caption text for the disposition header cell.
pub fn covering_caption(date: &PeriodDate) -> String {
    format!(
        "(Covered Period:{}0800 – 2000 {} {})",
        date.day, date.month, date.year
    )
}

/// First whitespace-separated token of a display name.
pub fn first_token(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or("")
}

/// Deterministic artifact filename:
/// `DISPOSITION_<day>_<month>_<year>_<firstToken>.docx`.
pub fn artifact_filename(full_name: &str, date: &PeriodDate) -> String {
    format!(
        "DISPOSITION_{}_{}_{}_{}.docx",
        date.day,
        date.month,
        date.year,
        first_token(full_name)
    )
}
