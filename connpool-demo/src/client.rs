//! One request/response exchange over a pooled connection.

use std::time::Duration;

use anyhow::{Context, bail};
use connpool::{ConnectionPool, Connector, PoolConfig, ReadEvent, SlotId};
use tokio::sync::oneshot;
use tokio_util::bytes::BytesMut;
use tracing::{debug, info};

/// Write `message` on `id` and wait for the first chunk of reply.
pub async fn exchange<C: Connector>(
    pool: &ConnectionPool<C>,
    id: SlotId,
    message: &[u8],
) -> anyhow::Result<BytesMut> {
    let (write_tx, write_rx) = oneshot::channel();
    pool.write_socket(id, message, move |status| {
        let _ = write_tx.send(status);
    })?;
    write_rx
        .await
        .context("write callback dropped")?
        .with_context(|| format!("writing to slot {id}"))?;
    debug!(slot = %id, bytes = message.len(), "Request written");

    let (read_tx, read_rx) = oneshot::channel();
    pool.read_socket(id, move |event| {
        let _ = read_tx.send(event);
    })?;

    match read_rx.await.context("read callback dropped")? {
        ReadEvent::Data(buf) => Ok(buf),
        ReadEvent::Eof => bail!("slot {id} closed before replying"),
        ReadEvent::Failed(e) => Err(e).with_context(|| format!("reading from slot {id}")),
    }
}

/// Borrow a connection, send `message`, and return the reply.
///
/// Must run inside a `LocalSet`. The connection goes back to the pool on
/// success and is closed on failure.
pub async fn run(config: PoolConfig, wait: Duration, message: &str) -> anyhow::Result<Vec<u8>> {
    let pool = ConnectionPool::new(config)?;

    let id = match pool.get_socket() {
        Some(id) => id,
        None => pool
            .wait_for(wait)
            .await
            .context("no connection became available")?,
    };
    info!(slot = %id, "Borrowed connection");

    let result = exchange(&pool, id, message.as_bytes()).await;
    match &result {
        Ok(_) => pool.put_socket(id)?,
        Err(_) => pool.close_socket(id, || {})?,
    }

    let stats = pool.stats();
    info!(stats = %serde_json::to_string(&stats)?, "Pool state after exchange");
    pool.shutdown();

    result.map(|buf| buf.to_vec())
}
