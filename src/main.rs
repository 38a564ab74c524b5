//! MuleWatch - Money Mule Detection Service
//!
//! Run with: cargo run
//!
//! Serves the upload/analysis HTTP surface. Heavy lifting happens in the
//! library crate; this binary just wires configuration, logging, and the
//! axum router together.

use clap::Parser;
use console::style;
use eyre::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mulewatch::config::Config;
use mulewatch::server::{create_router, AppState};

#[derive(Parser)]
#[command(name = "mulewatch", about = "Money mule detection service")]
struct Cli {
    /// TOML configuration file; falls back to environment variables
    #[arg(long)]
    config: Option<String>,

    /// Override the configured bind port
    #[arg(long)]
    port: Option<u16>,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔍 MULEWATCH - Money Mule Detection Engine").cyan().bold()
    );
    println!(
        "{}",
        style("    Cycles | Smurfing | Shell Chains").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mulewatch=info".parse()?),
        )
        .init();

    print_banner();

    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your environment or config file");
        return Err(e);
    }

    // Print configuration summary
    config.print_summary();
    println!();

    std::fs::create_dir_all(&config.upload_dir)?;

    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    println!(
        "{} Listening on {}",
        style("✓").green(),
        style(&addr).cyan().bold()
    );
    info!("MuleWatch v{} ready", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
