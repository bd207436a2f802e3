//! Turns the raw usage payload into the stable [`UsageSnapshot`] shape.
//!
//! The four top-level sections (`five_hour`, `seven_day`, `seven_day_sonnet`,
//! `extra_usage`) are read independently: one missing or malformed section
//! becomes `None` without touching the others.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::formatter::{format_cents, format_cents_whole, format_reset_duration};
use crate::core::models::usage::{ExtraUsage, Meter, PlanUsage, UsageSnapshot, WeeklyLimits};

#[derive(Deserialize)]
struct RawWindow {
    utilization: Option<f64>,
    resets_at: Option<Value>,
}

#[derive(Deserialize)]
struct RawExtraUsage {
    used_credits: Option<f64>,
    monthly_limit: Option<f64>,
    utilization: Option<f64>,
}

fn section<T: DeserializeOwned>(raw: &Value, key: &str) -> Option<T> {
    let value = raw.get(key).filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!(section = key, error = %e, "Dropping malformed usage section");
            None
        }
    }
}

/// Round half away from zero. No clamping to 0..=100.
pub fn round_percent(utilization: f64) -> i64 {
    utilization.round() as i64
}

fn parse_instant(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value?.as_str()?.parse::<DateTime<Utc>>().ok()
}

fn meter(raw: RawWindow, now: &DateTime<Utc>) -> Meter {
    Meter {
        percent: round_percent(raw.utilization.unwrap_or(0.0)),
        reset_time: parse_instant(raw.resets_at.as_ref())
            .map(|resets_at| format_reset_duration(&resets_at, now)),
    }
}

fn extra_usage(raw: RawExtraUsage) -> ExtraUsage {
    ExtraUsage {
        spent: format_cents(raw.used_credits.unwrap_or(0.0)),
        percent: round_percent(raw.utilization.unwrap_or(0.0)),
        monthly_limit: format_cents_whole(raw.monthly_limit.unwrap_or(0.0)),
    }
}

/// Normalize a parsed usage response as of `now`.
pub fn normalize(raw: &Value, now: DateTime<Utc>) -> UsageSnapshot {
    let window = |key: &str| section::<RawWindow>(raw, key).map(|w| meter(w, &now));

    UsageSnapshot {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        plan_usage: PlanUsage {
            current_session: window("five_hour"),
            weekly_limits: WeeklyLimits {
                all_models: window("seven_day"),
                sonnet_only: window("seven_day_sonnet"),
            },
        },
        extra_usage: section::<RawExtraUsage>(raw, "extra_usage").map(extra_usage),
    }
}
