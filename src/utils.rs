use chrono::{DateTime, Utc};

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Human readable size: `512 B`, `1.50 KB`, `700.00 MB`, `4.00 GB`
pub fn format_size(bytes: u64) -> String {
    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.2} KB", b as f64 / KB as f64),
        b if b < GB => format!("{:.2} MB", b as f64 / MB as f64),
        b => format!("{:.2} GB", b as f64 / GB as f64),
    }
}

/// How long ago `then` was relative to `now`, in the largest whole unit:
/// `"3 days"`, `"1 hour"`, `"2 minutes"`. Future dates render as `"0 minutes"`.
pub fn age_str(then: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let delta = (*now - *then).max(chrono::TimeDelta::zero());
    let days = delta.num_days();
    if days > 0 {
        return format!("{days} day{}", suffix(days));
    }
    let hours = delta.num_hours();
    if hours > 0 {
        return format!("{hours} hour{}", suffix(hours));
    }
    let minutes = delta.num_minutes();
    format!("{minutes} minute{}", suffix(minutes))
}

fn suffix(units: i64) -> &'static str {
    if units == 1 { "" } else { "s" }
}
