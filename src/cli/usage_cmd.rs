use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::alerts::{check_thresholds, Alert};
use crate::core::cache::{hours_window, UsageCache};
use crate::core::config::AppConfig;
use crate::core::credentials::store_from_config;
use crate::core::endpoints::Endpoints;
use crate::core::error::FetchError;
use crate::core::http::ReqwestTransport;
use crate::core::models::usage::UsageSnapshot;
use crate::core::pipeline::UsagePipeline;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CyclePayload<'a> {
    usage: Option<&'a UsageSnapshot>,
    last_fetch: Option<i64>,
    error: Option<ErrorPayload>,
}

#[derive(Serialize)]
struct ErrorPayload {
    kind: &'static str,
    message: String,
}

/// Result of one scheduled or manual fetch, after the cache was updated.
pub struct CycleReport {
    pub cache: UsageCache,
    pub error: Option<FetchError>,
    pub alert: Option<Alert>,
}

impl CycleReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

pub fn build_pipeline(config: &AppConfig) -> Result<UsagePipeline> {
    let endpoints = Endpoints::from_config(&config.endpoints)?;
    let transport = ReqwestTransport::new(std::time::Duration::from_secs(
        config.endpoints.timeout_secs,
    ))?;
    let store = store_from_config(&config.auth);
    tracing::debug!(store = %store.describe(), "Using credential store");
    Ok(UsagePipeline::new(store, Arc::new(transport), endpoints))
}

/// Fetch once and fold the outcome into the on-disk cache. A failure leaves
/// the last good snapshot in place.
pub async fn run_cycle(pipeline: &UsagePipeline, config: &AppConfig) -> CycleReport {
    let result = pipeline.fetch_usage().await;

    let mut cache = UsageCache::load();
    let (error, alert) = match result {
        Ok(snapshot) => {
            let retention = hours_window(config.settings.history_hours);
            cache.record_success(&snapshot, Utc::now(), retention);
            (None, check_thresholds(&snapshot, &config.settings))
        }
        Err(e) => {
            cache.record_failure(&e.to_string());
            (Some(e), None)
        }
    };

    if let Err(e) = cache.save() {
        tracing::warn!(error = %format!("{:#}", e), "Failed to write usage cache");
    }
    if let Some(alert) = &alert {
        tracing::warn!(label = alert.label, percent = alert.percent, "Usage threshold reached");
    }

    CycleReport {
        cache,
        error,
        alert,
    }
}

pub fn print_report(report: &CycleReport, opts: &OutputOptions) -> Result<()> {
    let cache = &report.cache;
    match opts.format {
        OutputFormat::Text => {
            let error_text = report.error.as_ref().map(|e| e.to_string());
            match &cache.cached_usage {
                Some(snapshot) => {
                    let text = renderer::render_snapshot(
                        snapshot,
                        cache.last_fetch().as_ref(),
                        error_text.as_deref(),
                        opts.use_color,
                    );
                    println!("{}", text);
                }
                None => {
                    if let Some(e) = &error_text {
                        eprintln!("{}", e);
                    }
                }
            }
            if let Some(alert) = &report.alert {
                eprintln!("{}", renderer::render_alert(alert, opts.use_color));
            }
        }
        OutputFormat::Json => {
            let payload = CyclePayload {
                usage: cache.cached_usage.as_ref(),
                last_fetch: cache.last_fetch_ms,
                error: report.error.as_ref().map(|e| ErrorPayload {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            };
            println!(
                "{}",
                opts.to_json(&payload)
                    .context("Failed to serialize usage payload")?
            );
        }
    }
    Ok(())
}

pub async fn run(config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let report = run_cycle(&pipeline, config).await;
    print_report(&report, opts)?;

    if report.failed() {
        std::process::exit(1);
    }
    Ok(())
}
