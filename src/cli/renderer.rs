use chrono::{DateTime, Utc};
use colored::{control, ColoredString, Colorize};

use crate::core::alerts::Alert;
use crate::core::formatter::{format_age, format_usage_bar};
use crate::core::models::usage::{Meter, UsageSnapshot};

const BAR_WIDTH: usize = 12;

/// Render the snapshot as the popup would show it.
///
/// Layout:
/// ```text
///  Claude usage
///   Session   88% used [███████████░]
///             Resets in 2 hr 15 min
///   Weekly    40% used [█████░░░░░░░]
///             Resets in 3 hr
///   Sonnet    12% used [█░░░░░░░░░░░]
///   Extra     $12.34 of $50 (25%)
///   Updated   5 min ago
///   Error     Request to ... timed out
/// ```
/// When `error` is set the snapshot shown is the last good one.
pub fn render_snapshot(
    snapshot: &UsageSnapshot,
    last_fetch: Option<&DateTime<Utc>>,
    error: Option<&str>,
    use_color: bool,
) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = vec![" Claude usage".bold().to_string()];

    let plan = &snapshot.plan_usage;
    let meters = [
        ("Session", plan.current_session.as_ref()),
        ("Weekly", plan.weekly_limits.all_models.as_ref()),
        ("Sonnet", plan.weekly_limits.sonnet_only.as_ref()),
    ];
    let mut any_meter = false;
    for (label, meter) in meters {
        if let Some(meter) = meter {
            render_meter(&mut lines, label, meter);
            any_meter = true;
        }
    }
    if !any_meter {
        lines.push(format!("  {}", "No plan usage reported".dimmed()));
    }

    if let Some(extra) = &snapshot.extra_usage {
        let text = format!("{} of {} ({}%)", extra.spent, extra.monthly_limit, extra.percent);
        lines.push(format!(
            "  {}     {}",
            "Extra".cyan(),
            color_by_used(extra.percent, &text)
        ));
    }

    if let Some(fetched) = last_fetch {
        lines.push(format!(
            "  {}   {}",
            "Updated".cyan(),
            format_age(fetched, &Utc::now()).dimmed()
        ));
    }

    if let Some(err) = error {
        lines.push(format!("  {}     {}", "Error".red().bold(), err.red()));
    }

    lines.join("\n")
}

fn render_meter(lines: &mut Vec<String>, label: &str, meter: &Meter) {
    let percent_str = format!("{}% used", meter.percent);
    let bar = format_usage_bar(meter.percent, BAR_WIDTH);

    lines.push(format!(
        "  {}  {} {}",
        format!("{:<8}", label).cyan(),
        color_by_used(meter.percent, &percent_str),
        bar.magenta()
    ));

    if let Some(reset) = &meter.reset_time {
        // 12 spaces to align under the percent column
        lines.push(format!("            {}", format!("Resets in {}", reset).dimmed()));
    }
}

/// Green below 75%, yellow below 90%, red from there on.
fn color_by_used(percent: i64, text: &str) -> ColoredString {
    if percent < 75 {
        text.green()
    } else if percent < 90 {
        text.yellow()
    } else {
        text.red()
    }
}

pub fn render_alert(alert: &Alert, use_color: bool) -> String {
    control::set_override(use_color);
    format!("{} {}", format!("{}:", alert.title()).yellow().bold(), alert.message())
}
