use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::core::config::AppConfig;
use crate::core::credentials::store_from_config;

pub fn init() -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    match AppConfig::default().save() {
        Ok(path) => println!("Generated config at {}", path.display()),
        Err(e) => {
            eprintln!("Failed to generate config: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CheckPayload {
    path: String,
    exists: bool,
    valid: bool,
    issues: Vec<String>,
}

impl CheckPayload {
    fn new(path: &Path, exists: bool, issues: Vec<String>) -> Self {
        Self {
            path: path.display().to_string(),
            exists,
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Validate the config file. Exits 1 when it cannot be loaded or has issues.
pub fn check(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    let exists = path.exists();

    let (config, issues) = if exists {
        match AppConfig::load() {
            Ok(c) => {
                let issues = c.validate();
                (Some(c), issues)
            }
            Err(e) => (None, vec![e.to_string()]),
        }
    } else {
        (None, Vec::new())
    };
    let failed = !issues.is_empty();

    match opts.format {
        OutputFormat::Json => {
            let payload = CheckPayload::new(&path, exists, issues);
            println!(
                "{}",
                opts.to_json(&payload).context("Failed to serialize config check")?
            );
        }
        OutputFormat::Text => {
            if !exists {
                eprintln!("No config file found at {}", path.display());
                eprintln!("Run `uwidget config init` to create one.");
            } else if let (Some(config), false) = (&config, failed) {
                println!("Config is valid: {}", path.display());
                println!("  Credential source: {}", config.auth.credential_source);
                println!(
                    "  Refresh every {} s, alert at {}%{}",
                    config.settings.refresh_interval_secs,
                    config.settings.notification_threshold_percent,
                    if config.settings.notifications_enabled {
                        ""
                    } else {
                        " (notifications off)"
                    }
                );
            } else {
                eprintln!("Config issues found in {}:", path.display());
                for issue in &issues {
                    eprintln!("  - {}", issue);
                }
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowPayload<'a> {
    path: String,
    exists: bool,
    credential_store: String,
    config: &'a AppConfig,
}

/// Print the effective config (file merged over defaults) and where
/// credentials will be read from.
pub fn show(config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    let store = store_from_config(&config.auth);

    match opts.format {
        OutputFormat::Json => {
            let payload = ShowPayload {
                path: path.display().to_string(),
                exists: path.exists(),
                credential_store: store.describe(),
                config,
            };
            println!(
                "{}",
                opts.to_json(&payload).context("Failed to serialize config")?
            );
        }
        OutputFormat::Text => {
            let suffix = if path.exists() { "" } else { " (not created, using defaults)" };
            println!("# {}{}", path.display(), suffix);
            println!("# credentials: {}", store.describe());
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
