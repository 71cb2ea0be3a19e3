//! connpool-demo: borrow a pooled connection and run one echo exchange.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use connpool::PoolConfig;
use connpool_demo::{client, logging, settings};
use tokio::task::LocalSet;

#[derive(Debug, Parser)]
#[command(name = "connpool-demo", version, about)]
struct Args {
    /// JSON file with pool settings, layered over CONNPOOL_* variables.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Number of connection slots.
    #[arg(long)]
    capacity: Option<usize>,

    #[arg(long)]
    reconnect_interval_ms: Option<u64>,

    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    /// How long to wait for a free connection.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    #[arg(long, default_value = "hello")]
    message: String,
}

impl Args {
    fn pool_config(&self) -> anyhow::Result<PoolConfig> {
        let mut config = settings::load(PoolConfig::from_env(), self.config.as_deref())?;

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(ms) = self.reconnect_interval_ms {
            config.reconnect_interval_ms = ms;
        }
        if let Some(attempts) = self.max_reconnect_attempts {
            config.max_reconnect_attempts = attempts;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let args = Args::parse();
    let config = args.pool_config()?;
    tracing::debug!(?config, "Resolved pool config");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    let reply = local.block_on(
        &runtime,
        client::run(config, Duration::from_millis(args.timeout_ms), &args.message),
    )?;

    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}
