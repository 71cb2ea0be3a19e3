//! Transport seam between the pool and the network.
//!
//! A connect attempt has two phases. `allocate` reserves the transport
//! synchronously (this is where descriptor exhaustion shows up) and
//! `connect` completes the handshake on the reactor.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};

#[async_trait(?Send)]
pub trait Connector: 'static {
    /// Transport reserved by `allocate`, not yet connected.
    type Socket: 'static;
    type Stream: AsyncRead + AsyncWrite + Unpin + 'static;

    fn allocate(&self, addr: SocketAddr) -> io::Result<Self::Socket>;

    async fn connect(&self, socket: Self::Socket, addr: SocketAddr) -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl TcpConnector {
    pub fn new(nodelay: bool) -> Self {
        Self { nodelay }
    }
}

#[async_trait(?Send)]
impl Connector for TcpConnector {
    type Socket = TcpSocket;
    type Stream = TcpStream;

    fn allocate(&self, addr: SocketAddr) -> io::Result<TcpSocket> {
        if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
    }

    async fn connect(&self, socket: TcpSocket, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = socket.connect(addr).await?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }
}
