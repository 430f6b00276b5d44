//! Per-connection read/write loop (§4.7/§4.8): frames inbound envelopes
//! onto a channel for the node to consume, and drains an outbound
//! channel onto the socket, applying the connection's [`WireOptions`].

use crate::error::NetworkError;
use crate::transport::message::Envelope;
use crate::transport::wire::{self, WireOptions};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

/// A running peer connection: `outbound` feeds frames out over the
/// socket, `inbound` is where `run` delivers frames parsed off the wire.
pub struct PeerConnection {
    pub peer_addr: String,
    pub outbound: mpsc::Sender<Envelope>,
}

impl PeerConnection {
    /// Drive one connection's read and write halves until either side
    /// closes or errors. Runs until the stream ends; callers should
    /// `tokio::spawn` this.
    pub async fn run<R, W>(
        peer_addr: String,
        mut reader: ReadHalf<R>,
        mut writer: WriteHalf<W>,
        opts: WireOptions,
        inbound_tx: mpsc::Sender<(String, Envelope)>,
        mut outbound_rx: mpsc::Receiver<Envelope>,
    ) -> Result<(), NetworkError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                read_result = wire::read_envelope(&mut reader, &opts) => {
                    match read_result? {
                        Some(envelope) => {
                            if inbound_tx.send((peer_addr.clone(), envelope)).await.is_err() {
                                return Ok(());
                            }
                        }
                        None => return Ok(()),
                    }
                }
                send = outbound_rx.recv() => {
                    match send {
                        Some(envelope) => {
                            wire::write_envelope(&mut writer, &envelope, &opts).await?;
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::primitives::{keypair_generate, sign};
    use crate::transport::message::Payload;
    use tokio::io::split;

    fn sample_envelope(nonce: u64) -> Envelope {
        let (sk, pk) = keypair_generate();
        let payload = Payload::Ping { nonce };
        let bytes = Envelope::signing_bytes(&pk.to_bytes(), 1, nonce, &payload);
        let signature = sign(&sk, &bytes);
        Envelope {
            sender: pk.to_bytes(),
            timestamp_ms: 1,
            nonce,
            payload,
            signature,
        }
    }

    #[tokio::test]
    async fn relays_one_frame_then_closes_on_writer_drop() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_r, mut client_w) = split(client);
        let (server_r, server_w) = split(server);

        let envelope = sample_envelope(42);
        let encoded = {
            let mut buf = Vec::new();
            wire::write_envelope(&mut buf, &envelope, &WireOptions::default())
                .await
                .unwrap();
            buf
        };

        let (inbound_tx, mut inbound_rx) = mpsc::channel(4);
        let (outbound_tx, outbound_rx) = mpsc::channel(4);

        let handle = tokio::spawn(PeerConnection::run(
            "peer-a".to_string(),
            server_r,
            server_w,
            WireOptions::default(),
            inbound_tx,
            outbound_rx,
        ));

        use tokio::io::AsyncWriteExt;
        client_w.write_all(&encoded).await.unwrap();

        let (from, received) = inbound_rx.recv().await.unwrap();
        assert_eq!(from, "peer-a");
        assert_eq!(received.nonce, 42);

        drop(client_w);
        drop(client_r);
        drop(outbound_tx);
        handle.await.unwrap().unwrap();
    }
}
