//! # scandrop
//!
//! Watches an incoming directory for scanned documents, waits for each file
//! to finish uploading, reads the first barcode it can find and moves the
//! document into `finished/<CODE>.pdf`. Documents that cannot be identified
//! end up in `failed/` with the reason in their name.
//!
//! Runs until SIGINT or SIGTERM, then drains the worker pool.

mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use scandrop_config::{Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigWarnings};
use scandrop_core::intake::{
    IntakeContext, IntakeLayout, WatchExit, WatchLoop, WorkerPool,
    adapters::{PopplerRenderer, ZbarIdentifier},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "scandrop")]
#[command(about = "File scanned documents by the barcode printed on them")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "SCANDROP_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ConfigLoad { config, warnings } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config,
        env_file: cli.env_file,
    })
    .load()
    .context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    report_config(&config, &warnings);

    run(config).await
}

fn report_config(config: &Config, warnings: &ConfigWarnings) {
    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    match &config.metadata.config_path {
        Some(path) => info!(path = %path.display(), "configuration file loaded"),
        None => info!("running without a configuration file"),
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    let intake = &config.intake;
    info!(
        incoming = %intake.directories.incoming.display(),
        processing = %intake.directories.processing.display(),
        finished = %intake.directories.finished.display(),
        failed = %intake.directories.failed.display(),
        "intake directories"
    );
    info!(
        workers = intake.pool.workers,
        queue_capacity = intake.pool.queue_capacity,
        shutdown_grace_ms = intake.pool.shutdown_grace_ms,
        poll_timeout_ms = intake.watch.poll_timeout_ms,
        sweep_interval_ms = ?intake.watch.sweep_interval_ms,
        extensions = ?intake.watch.extensions,
        stability = ?intake.stability,
        render_dpi = intake.identify.render_dpi,
        orientations = ?intake.identify.orientations,
        "effective configuration"
    );
    info!(
        pdftoppm = %config.tools.pdftoppm_path.display(),
        pdfinfo = %config.tools.pdfinfo_path.display(),
        zbarimg = %config.tools.zbarimg_path.display(),
        "external tools"
    );
}

async fn run(config: Config) -> anyhow::Result<()> {
    let Config { intake, tools, .. } = config;

    let layout = IntakeLayout::prepare(&intake.directories)
        .context("failed to prepare intake directories")?;
    let watch_config = intake.watch.clone();
    let pool_config = intake.pool;

    let renderer = PopplerRenderer::new(tools.pdftoppm_path, tools.pdfinfo_path);
    renderer
        .check()
        .context("poppler-utils are not usable; set PDFTOPPM_PATH and PDFINFO_PATH")?;
    let identifier = ZbarIdentifier::new(tools.zbarimg_path);
    identifier
        .check()
        .context("zbarimg is not usable; set ZBARIMG_PATH")?;
    let renderer = Arc::new(renderer);
    let identifier = Arc::new(identifier);
    let ctx = Arc::new(
        IntakeContext::new(layout, Arc::new(intake), renderer, identifier)
            .context("failed to build intake context")?,
    );

    let pool = WorkerPool::start(Arc::clone(&ctx), pool_config);
    let cancel = CancellationToken::new();

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        signal_token.cancel();
    });

    let watch = WatchLoop::new(ctx.layout(), watch_config, pool.dispatcher());
    let exit = watch.run(cancel.clone()).await;
    cancel.cancel();

    let drain = pool.shutdown().await;
    if !drain.is_clean() {
        warn!(
            aborted = drain.aborted,
            "shutdown interrupted tasks; their files remain in processing"
        );
    }

    match exit.context("watch loop failed")? {
        WatchExit::Cancelled => {
            info!("scandrop stopped");
            Ok(())
        }
        WatchExit::WatchLost(reason) => bail!("watch on incoming directory lost: {reason}"),
    }
}
