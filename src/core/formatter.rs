use chrono::{DateTime, Utc};

pub const CURRENCY_SYMBOL: &str = "$";

/// Time left until `resets_at`, in whole hours and minutes.
///
/// "2 hr 15 min", "3 hr", "45 min"; anything at or before `now` is "0 min".
pub fn format_reset_duration(resets_at: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let diff_ms = (*resets_at - *now).num_milliseconds();
    if diff_ms <= 0 {
        return "0 min".to_string();
    }

    let hours = diff_ms / 3_600_000;
    let minutes = (diff_ms % 3_600_000) / 60_000;

    match (hours, minutes) {
        (0, m) => format!("{} min", m),
        (h, 0) => format!("{} hr", h),
        (h, m) => format!("{} hr {} min", h, m),
    }
}

/// Minor units (cents) to "$12.34".
pub fn format_cents(cents: f64) -> String {
    format!("{}{:.2}", CURRENCY_SYMBOL, cents / 100.0)
}

/// Minor units (cents) to a whole-unit amount: 5000 -> "$50", 4950 -> "$50".
pub fn format_cents_whole(cents: f64) -> String {
    format!("{}{}", CURRENCY_SYMBOL, (cents / 100.0).round() as i64)
}

/// Returns "[████░░░░░░░░]" where █ = used portion, ░ = what is left.
pub fn format_usage_bar(percent: i64, width: usize) -> String {
    let percent = percent.clamp(0, 100) as f64;
    let used_blocks = ((percent / 100.0) * width as f64).round() as usize;
    let remaining_blocks = width.saturating_sub(used_blocks);

    format!("[{}{}]", "█".repeat(used_blocks), "░".repeat(remaining_blocks))
}

/// "just now", "5 min ago", "2 hr ago", "3 days ago".
pub fn format_age(then: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let minutes = (*now - *then).num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{} min ago", minutes)
    } else if minutes < 24 * 60 {
        format!("{} hr ago", minutes / 60)
    } else {
        let days = minutes / (24 * 60);
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
