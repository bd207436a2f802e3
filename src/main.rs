mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::output::{detect_color, OutputFormat, OutputOptions};
use crate::core::config::AppConfig;

#[derive(Parser)]
#[command(name = "uwidget", about = "Claude plan usage monitor", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text|json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch once and display plan usage
    Usage,
    /// Keep fetching on a timer until interrupted
    Watch {
        /// Seconds between fetches (default: refresh_interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Show cached usage history
    History {
        /// How far back to look (default: history_hours)
        #[arg(long)]
        hours: Option<u64>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print the effective configuration
    Show,
}

/// Filter used when `RUST_LOG` is unset. Targets are module paths of this
/// binary, so the directive has to name the crate the binary compiles as.
fn default_log_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "warn" };
    format!("{}={}", env!("CARGO_CRATE_NAME"), level)
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring unreadable config, using defaults");
        AppConfig::default()
    });

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::from_name(
            cli.format
                .as_deref()
                .unwrap_or(config.settings.default_format.as_str()),
        )
    };
    let output_opts = OutputOptions {
        format,
        pretty: cli.pretty,
        use_color: detect_color(!cli.no_color, &config.settings.color),
    };

    match cli.command {
        None | Some(Commands::Usage) => cli::usage_cmd::run(&config, &output_opts).await?,
        Some(Commands::Watch { interval }) => {
            cli::watch_cmd::run(&config, interval, &output_opts).await?
        }
        Some(Commands::History { hours }) => {
            cli::history_cmd::run(&config, hours, &output_opts)?
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init()?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Show => cli::config_cmd::show(&config, &output_opts)?,
        },
    }

    Ok(())
}
