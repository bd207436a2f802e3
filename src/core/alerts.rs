use crate::core::config::Settings;
use crate::core::models::usage::UsageSnapshot;

/// The meter that crossed the notification threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub label: &'static str,
    pub percent: i64,
}

impl Alert {
    pub fn title(&self) -> &'static str {
        "Claude Usage Alert"
    }

    pub fn message(&self) -> String {
        format!("{} at {}% - approaching limit", self.label, self.percent)
    }
}

/// Every meter present in the snapshot, with its display label.
pub fn labeled_meters(snapshot: &UsageSnapshot) -> Vec<(&'static str, i64)> {
    let plan = &snapshot.plan_usage;
    [
        ("Current session", plan.current_session.as_ref().map(|m| m.percent)),
        (
            "Weekly (all models)",
            plan.weekly_limits.all_models.as_ref().map(|m| m.percent),
        ),
        (
            "Weekly (Sonnet)",
            plan.weekly_limits.sonnet_only.as_ref().map(|m| m.percent),
        ),
        (
            "Extra usage spending",
            snapshot.extra_usage.as_ref().map(|e| e.percent),
        ),
    ]
    .into_iter()
    .filter_map(|(label, percent)| percent.map(|p| (label, p)))
    .collect()
}

/// Highest meter at or above the configured threshold, if notifications are on.
/// On a tie the later meter wins.
pub fn check_thresholds(snapshot: &UsageSnapshot, settings: &Settings) -> Option<Alert> {
    if !settings.notifications_enabled {
        return None;
    }
    let threshold = settings.notification_threshold_percent;

    labeled_meters(snapshot)
        .into_iter()
        .filter(|(_, percent)| *percent >= threshold)
        .max_by_key(|(_, percent)| *percent)
        .map(|(label, percent)| Alert { label, percent })
}
