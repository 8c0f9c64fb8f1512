use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tidecast::{MarineForecastService, TideCastConfig, logging, web};

#[derive(Parser)]
#[command(name = "tidecast", version, about = "Tide, weather and marine conditions service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "TIDECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listening port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TideCastConfig::load_from_path(cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    logging::init_logging(&config.logging)?;
    tracing::info!(version = tidecast::VERSION, "Starting tidecast");

    let service = Arc::new(MarineForecastService::from_config(&config)?);
    web::run(&config.server, service).await
}
