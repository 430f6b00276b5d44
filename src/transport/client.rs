//! Outbound connection establishment (§4.7): dial a peer address, tune
//! the socket the same way the server does for inbound connections, and
//! hand back the split halves ready for [`PeerConnection::run`].

use crate::error::NetworkError;
use std::time::Duration;
use tokio::io::split;
use tokio::net::TcpStream;

/// Dial `addr`, returning the split read/write halves of a tuned socket.
pub async fn dial(
    addr: &str,
) -> Result<
    (
        tokio::io::ReadHalf<TcpStream>,
        tokio::io::WriteHalf<TcpStream>,
    ),
    NetworkError,
> {
    let stream = tokio::time::timeout(Duration::from_secs(10), TcpStream::connect(addr))
        .await
        .map_err(|_| NetworkError::Timeout)??;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(error = %e, "failed to set TCP_NODELAY");
    }
    let socket = socket2::SockRef::from(&stream);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        tracing::warn!(error = %e, "failed to set TCP keepalive");
    }

    Ok(split(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::server::Server;

    #[tokio::test]
    async fn dial_connects_to_a_bound_listener() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server
                .run(
                    Default::default(),
                    tokio::sync::mpsc::channel(1).0,
                    |_, _| {},
                )
                .await;
        });

        let result = dial(&addr.to_string()).await;
        assert!(result.is_ok());
    }
}
