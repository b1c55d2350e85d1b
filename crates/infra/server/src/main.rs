//! Eventgate server binary.

use clap::Parser;
use eventgate_adapter_memory::MemoryStore;
use eventgate_server::{load_config, EventgateServer, LogFormat, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Partner webhook delivery pipeline.
#[derive(Debug, Parser)]
#[command(name = "eventgate-server", version, about)]
struct Args {
    /// TOML configuration file. Without one, pipeline settings come from
    /// the environment.
    #[arg(short, long, env = "EVENTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration.
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_logging(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::from_env(),
    };
    if let Some(port) = args.port {
        config = config.port(port);
    }

    init_logging(&config);

    let store = Arc::new(MemoryStore::from_config(&config.pipeline));
    let server = EventgateServer::new(config, store)?;
    server.run().await?;

    Ok(())
}
