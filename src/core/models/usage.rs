use serde::{Deserialize, Serialize};

/// One utilization meter: rounded percent plus time until it resets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meter {
    /// Rounded utilization. Not clamped: upstream values above 100 or below 0
    /// come through as-is.
    pub percent: i64,
    /// e.g. "2 hr 15 min"; `None` when no valid reset instant was supplied
    pub reset_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyLimits {
    pub all_models: Option<Meter>,
    pub sonnet_only: Option<Meter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUsage {
    /// 5-hour rolling window
    pub current_session: Option<Meter>,
    pub weekly_limits: WeeklyLimits,
}

/// Metered spending beyond the plan allowance, already formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraUsage {
    /// "$12.34"
    pub spent: String,
    pub percent: i64,
    /// "$50"
    pub monthly_limit: String,
}

/// Normalized, display-ready result of one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    /// ISO-8601 instant the snapshot was produced
    pub timestamp: String,
    pub plan_usage: PlanUsage,
    pub extra_usage: Option<ExtraUsage>,
}
