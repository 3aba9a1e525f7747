//! `MockNet` CLI

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mocknet::catalog;
use mocknet::config::Config;
use mocknet::network::ControlApi;
use mocknet::MockNet;

#[derive(Parser, Debug)]
#[command(
    name = "mocknet",
    about = "HTTP stub server with a REST control API and record-to-stub capture",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mocknet.toml")]
    config: PathBuf,

    /// Stub listener port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Control API port (overrides the config file)
    #[arg(long)]
    admin_port: Option<u16>,

    /// Directory for persisted endpoint documents (overrides the config file)
    #[arg(long, value_name = "DIR")]
    storage_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Start the stub listener immediately instead of waiting for the control API
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        Config::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        Config::default()
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(admin_port) = args.admin_port {
        config.admin_port = admin_port;
    }
    if let Some(storage_dir) = args.storage_dir {
        config.storage_dir = storage_dir;
    }
    config.validate()?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if args.validate {
        println!("Configuration is valid");
        return Ok(());
    }

    let seed = config.seed_docusign;
    let app = Arc::new(MockNet::new(config));

    if seed {
        catalog::seed_docusign(app.registry(), app.store()).await;
    }

    let control = ControlApi::new(Arc::clone(&app));
    control.start().await.context("Failed to start control API")?;

    if args.autostart {
        app.server()
            .start()
            .await
            .context("Failed to start mock server")?;
    }

    tokio::signal::ctrl_c().await?;
    info!("Received SIGINT, shutting down");

    app.shutdown().await;
    if !control.stop().await.changed() {
        warn!("Control API was not running");
    }

    info!("Shutdown complete");
    Ok(())
}
