//! Inbound connection accept loop (§4.7): binds a listener, tunes each
//! accepted socket (`TCP_NODELAY` plus keepalive probes), and spawns a
//! [`PeerConnection`] per peer. Blacklisting, rate limiting, and
//! connection-count ceilings live in the peer manager, not here.

use crate::error::NetworkError;
use crate::transport::connection::PeerConnection;
use crate::transport::message::Envelope;
use crate::transport::wire::WireOptions;
use std::time::Duration;
use tokio::io::split;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(addr: &str) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, handing each one's frames to
    /// `inbound_tx` and registering an outbound sender with `on_connect`
    /// so the caller can route gossip/round traffic to the new peer.
    pub async fn run(
        self,
        opts: WireOptions,
        inbound_tx: mpsc::Sender<(String, Envelope)>,
        on_connect: impl Fn(String, mpsc::Sender<Envelope>) + Send + Sync + 'static,
    ) -> Result<(), NetworkError> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            tune_socket(&stream);

            let peer_addr = addr.to_string();
            let (reader, writer) = split(stream);
            let (outbound_tx, outbound_rx) = mpsc::channel(128);
            on_connect(peer_addr.clone(), outbound_tx);

            let inbound_tx = inbound_tx.clone();
            let opts = opts.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    PeerConnection::run(peer_addr.clone(), reader, writer, opts, inbound_tx, outbound_rx)
                        .await
                {
                    tracing::debug!(peer = %peer_addr, error = %e, "peer connection closed");
                }
            });
        }
    }
}

fn tune_socket(stream: &tokio::net::TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(error = %e, "failed to set TCP_NODELAY");
    }
    let socket = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        tracing::warn!(error = %e, "failed to set TCP keepalive");
    }
}
