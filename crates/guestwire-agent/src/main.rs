//! guestwire-agent: guest-side endpoint of the remote object protocol.
//!
//! Listens on a Unix socket (vsock-compatible) and serves JSON-RPC requests
//! against a per-connection guest session.

use guestwire_agent::config::AgentConfig;
use guestwire_agent::server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guestwire_agent=debug".parse()?),
        )
        .init();

    info!("guestwire-agent starting...");

    let config = AgentConfig::from_env();
    config.validate()?;
    info!(
        socket = %config.socket_path.display(),
        max_output = config.limits.max_output,
        max_read = config.limits.max_read,
        "configuration loaded"
    );

    let listener = server::bind(&config.socket_path)?;
    server::serve(listener, config).await;
    Ok(())
}
