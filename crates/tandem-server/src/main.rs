//! Tandem relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port
//! tandem-server --bind 0.0.0.0:7878
//!
//! # Smaller deployment with verbose logs
//! tandem-server --max-connections 500 --log-level debug
//! ```

use std::time::Duration;

use clap::Parser;
use tandem_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Anonymous peer-pairing relay
#[derive(Parser, Debug)]
#[command(name = "tandem-server")]
#[command(about = "Anonymous one-to-one chat pairing relay")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7878")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds a new connection has to send hello
    #[arg(long, default_value = "10")]
    hello_timeout_secs: u64,

    /// Per-connection outbound queue length
    #[arg(long, default_value = "64")]
    outbound_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Tandem server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        max_connections: args.max_connections,
        hello_timeout: Duration::from_secs(args.hello_timeout_secs),
        outbound_capacity: args.outbound_capacity,
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
