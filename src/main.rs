mod api;
mod config;
mod error;
mod provider;
mod reconcile;
mod record;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(name = "ddns-reconcile")]
#[command(about = "A DDNS service that keeps a provider's record in line with the caller's IP")]
struct Args {
    /// Path to the configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration first (before logger init)
    let config = match &args.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    };

    // Initialize logger with config log level (env var takes precedence)
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.server.log_level)
    ).init();

    match &args.config {
        Some(path) => info!("Loaded configuration from: {}", path),
        None => info!("No configuration file given, using defaults"),
    }
    info!("Provider call timeout: {}s", config.server.timeout_secs);

    // Create router
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = api::create_router(config);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    info!("DDNS endpoint: POST /ddns/{{aliyun|cloudflare|namesilo}}");

    axum::serve(listener, app).await?;

    Ok(())
}
