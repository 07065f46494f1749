//! Visit Tracker - Main entry point
//!
//! This binary is launched by the browser as a native messaging host. Frames
//! travel over stdin/stdout, so all logging goes to stderr.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use visit_tracker::{
    Config, ContentCapturer, ContextEnricher, EventDispatcher, NativeBridge, UrlPolicy,
    VisitPipeline, VisitTracker,
};

/// Visit Tracker CLI.
#[derive(Parser)]
#[command(name = "visit-tracker")]
#[command(about = "Records long browser visits and posts them to an ingestion endpoint")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingestion endpoint, overrides the configuration file
    #[arg(long, env = "VISIT_TRACKER_ENDPOINT")]
    endpoint: Option<String>,

    /// Write the default configuration file and exit
    #[arg(long)]
    init_config: bool,

    /// Extra arguments passed by the browser (caller origin, window handle)
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    browser_args: Vec<String>,
}

fn init_logging(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false),
        )
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_config_path);

    if cli.init_config {
        Config::default().save_to_path(config_path.clone())?;
        eprintln!("Wrote default configuration to {:?}", config_path);
        return Ok(());
    }

    let mut config = Config::load_from_path(config_path.clone());
    if let Some(endpoint) = cli.endpoint {
        config.ingestion.endpoint = endpoint;
    }

    init_logging(&config.general.log_level);

    info!("Starting Visit Tracker");
    if !cli.browser_args.is_empty() {
        debug!("Launched by browser with {:?}", cli.browser_args);
    }
    info!("Configuration loaded from {:?}", config_path);

    if !config.general.enabled {
        info!("Tracking is disabled in configuration, exiting");
        return Ok(());
    }

    let dispatcher = EventDispatcher::new(&config.ingestion)?;
    info!("Posting visits to {}", dispatcher.endpoint());

    let (bridge, events) = NativeBridge::spawn(
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.timing.host_call_timeout(),
    );

    let policy = Arc::new(UrlPolicy::new(&config.privacy));
    if policy.is_empty() {
        info!("No URL ignore rules configured");
    }
    let pipeline = Arc::new(VisitPipeline::new(
        ContentCapturer::new(bridge.clone(), config.timing.capture_timeout()),
        ContextEnricher::new(bridge.clone(), &config.timing, &config.enrichment),
        Arc::new(dispatcher),
        Arc::clone(&policy),
        config.timing.capture_defer(),
    ));

    let mut tracker = VisitTracker::new(&config.timing, bridge, pipeline, policy);
    tracker.init().await;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let status = tracker.run(events, shutdown).await;

    info!(
        "Visit Tracker stopped ({} visits qualified, {} tabs observed)",
        status.qualified_total, status.observed_tabs
    );

    Ok(())
}
