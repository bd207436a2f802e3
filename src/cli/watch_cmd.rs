use anyhow::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::usage_cmd::{build_pipeline, print_report, run_cycle};
use crate::core::config::AppConfig;

/// Interval to poll at: the CLI override if given, else the configured one.
pub fn effective_interval(config: &AppConfig, override_secs: Option<u64>) -> Duration {
    let secs = override_secs.unwrap_or(config.settings.refresh_interval_secs);
    Duration::from_secs(secs.max(1))
}

/// Poll on a fixed cadence until Ctrl-C. The first cycle runs immediately.
/// Failed cycles are reported and retried on the next tick, nothing sooner.
pub async fn run(
    config: &AppConfig,
    interval_override: Option<u64>,
    opts: &OutputOptions,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let interval = effective_interval(config, interval_override);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(seconds = interval.as_secs(), "Refresh timer set");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        // Not raced against shutdown: a refresh that rotated the token has to
        // reach the store before we exit.
        let report = run_cycle(&pipeline, config).await;
        if let Some(e) = &report.error {
            tracing::warn!(error = %e, "Fetch failed; retrying on next tick");
        }
        print_report(&report, opts)?;
        if opts.format == OutputFormat::Text {
            println!();
        }
    }

    tracing::info!("Stopped");
    Ok(())
}
