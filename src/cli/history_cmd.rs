use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use colored::{control, Colorize};

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::alerts::labeled_meters;
use crate::core::cache::{hours_window, HistoryEntry, UsageCache};
use crate::core::config::AppConfig;

/// One history line: local time, then every meter present.
///
/// `14:30  Current session 42% | Weekly (all models) 17%`
pub fn format_entry(entry: &HistoryEntry) -> String {
    let when = DateTime::<Utc>::from_timestamp_millis(entry.timestamp_ms)
        .map(|t| t.with_timezone(&Local).format("%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "??-?? ??:??".to_string());

    let meters: Vec<String> = labeled_meters(&entry.data)
        .into_iter()
        .map(|(label, percent)| format!("{} {}%", label, percent))
        .collect();

    if meters.is_empty() {
        format!("{}  {}", when.dimmed(), "no meters".dimmed())
    } else {
        format!("{}  {}", when.dimmed(), meters.join(" | "))
    }
}

pub fn run(config: &AppConfig, hours: Option<u64>, opts: &OutputOptions) -> Result<()> {
    let hours = hours.unwrap_or(config.settings.history_hours);
    let cache = UsageCache::load();
    let entries = cache.history_since(Utc::now(), hours_window(hours));

    match opts.format {
        OutputFormat::Json => {
            println!(
                "{}",
                opts.to_json(&entries)
                    .context("Failed to serialize usage history")?
            );
        }
        OutputFormat::Text => {
            control::set_override(opts.use_color);
            if entries.is_empty() {
                println!("No usage recorded in the last {} hr", hours);
                return Ok(());
            }
            for entry in entries {
                println!("{}", format_entry(entry));
            }
        }
    }
    Ok(())
}
