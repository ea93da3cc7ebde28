//! Room hub - Entry Point
//!
//! Binds the listener, starts the Hub actor and accepts connections.

use std::env;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_hub::{serve, Config, Hub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_hub=info")),
        )
        .init();

    // Listen address from the command line or the default
    let config = Config::from_args(env::args().skip(1))?;

    let listener = match TcpListener::bind(&config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.addr, e);
            return Err(e.into());
        }
    };
    info!("Listening on {}", config.addr);

    let (hub, _hub_task) = Hub::spawn(config.hub_capacity);

    serve(listener, hub, config).await;

    Ok(())
}
