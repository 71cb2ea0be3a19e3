//! TCP echo server used as the demo's remote endpoint.
//!
//! Every chunk read is written straight back. A peer that half-closes still
//! receives everything it sent before its shutdown.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 8 * 1024;

/// Accept connections forever, echoing each on its own task.
pub async fn serve(listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "Accepted connection");
        tokio::spawn(echo(stream, peer));
    }
}

async fn echo(mut stream: TcpStream, peer: SocketAddr) {
    let (mut reader, mut writer) = stream.split();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                debug!(%peer, bytes = n, "Echoing");
                if let Err(e) = writer.write_all(&buf[..n]).await {
                    warn!(%peer, error = %e, "Echo write failed");
                    return;
                }
            }
            Err(e) => {
                warn!(%peer, error = %e, "Echo read failed");
                return;
            }
        }
    }

    // Peer finished sending; finish our side too.
    if let Err(e) = writer.shutdown().await {
        debug!(%peer, error = %e, "Shutdown after peer EOF failed");
    }
    info!(%peer, "Connection closed");
}
