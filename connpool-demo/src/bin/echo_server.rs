//! echo-server: TCP echo endpoint for exercising the pool.

use clap::Parser;
use connpool_demo::{echo, logging};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "echo-server", version, about)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let args = Args::parse();

    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!(addr = %listener.local_addr()?, "Echo server listening");

    tokio::select! {
        result = echo::serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
    }
    Ok(())
}
