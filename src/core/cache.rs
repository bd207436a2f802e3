use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::models::usage::UsageSnapshot;

const CACHE_VERSION: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp_ms: i64,
    pub data: UsageSnapshot,
}

/// Last-known-good snapshot plus a rolling history. Written after every cycle;
/// concurrent writers simply overwrite each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCache {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub cached_usage: Option<UsageSnapshot>,
    #[serde(default)]
    pub last_fetch_ms: Option<i64>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Default for UsageCache {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            cached_usage: None,
            last_fetch_ms: None,
            last_error: None,
            history: Vec::new(),
        }
    }
}

/// An hour count as a window, saturating instead of overflowing.
pub fn hours_window(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}

pub fn cache_path() -> PathBuf {
    let base = std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".cache")
        });
    base.join("usagewidget").join("usage-cache.json")
}

impl UsageCache {
    /// Load the cache from the default path, or return an empty cache.
    pub fn load() -> Self {
        Self::load_from(&cache_path())
    }

    /// Unreadable, unparseable or wrong-version files give an empty cache.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cache: Self = serde_json::from_str(&content).unwrap_or_default();
                if cache.version != CACHE_VERSION {
                    return Self::default();
                }
                cache
            }
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&cache_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_string(self).context("Failed to serialize usage cache")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write cache to {}", path.display()))?;
        Ok(())
    }

    /// Replace the cached snapshot, append it to history and drop entries
    /// older than `retention`.
    pub fn record_success(
        &mut self,
        snapshot: &UsageSnapshot,
        now: DateTime<Utc>,
        retention: Duration,
    ) {
        let now_ms = now.timestamp_millis();
        self.cached_usage = Some(snapshot.clone());
        self.last_fetch_ms = Some(now_ms);
        self.last_error = None;
        self.history.push(HistoryEntry {
            timestamp_ms: now_ms,
            data: snapshot.clone(),
        });
        let cutoff = now_ms.saturating_sub(retention.num_milliseconds());
        self.history.retain(|entry| entry.timestamp_ms > cutoff);
    }

    /// Keep the last good snapshot; remember why this cycle failed.
    pub fn record_failure(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch_ms.and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    /// History entries newer than `window` before `now`, oldest first.
    pub fn history_since(&self, now: DateTime<Utc>, window: Duration) -> Vec<&HistoryEntry> {
        let cutoff = now
            .checked_sub_signed(window)
            .map(|t| t.timestamp_millis())
            .unwrap_or(i64::MIN);
        self.history
            .iter()
            .filter(|e| e.timestamp_ms > cutoff)
            .collect()
    }
}
