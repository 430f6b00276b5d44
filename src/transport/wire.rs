//! Length-prefixed bincode wire protocol (§4.6): `[u32 be length][payload]`,
//! where the payload is an optionally gzip-compressed, optionally
//! AES-GCM-encrypted, bincode-serialized [`Envelope`].

use crate::error::NetworkError;
use crate::transport::compression;
use crate::transport::encryption::SessionCipher;
use crate::transport::message::Envelope;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_SIZE: u32 = 4 * 1024 * 1024;

#[derive(Default, Clone)]
pub struct WireOptions {
    pub compression_level: Option<u32>,
    pub cipher: Option<SessionCipher>,
}

pub async fn write_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
    opts: &WireOptions,
) -> Result<(), NetworkError> {
    let mut payload = bincode::serialize(envelope)
        .map_err(|e| NetworkError::Unreachable(format!("serialize: {e}")))?;

    if let Some(level) = opts.compression_level {
        payload = compression::compress(&payload, level);
    }
    if let Some(cipher) = &opts.cipher {
        payload = cipher
            .encrypt(&payload)
            .map_err(|e| NetworkError::Unreachable(format!("encrypt: {e}")))?;
    }

    let len = payload.len() as u32;
    if len > MAX_FRAME_SIZE {
        return Err(NetworkError::FrameTooLarge(len as usize));
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_envelope<R: AsyncRead + Unpin>(
    reader: &mut R,
    opts: &WireOptions,
) -> Result<Option<Envelope>, NetworkError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(NetworkError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(NetworkError::FrameTooLarge(len as usize));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    if let Some(cipher) = &opts.cipher {
        payload = cipher
            .decrypt(&payload)
            .map_err(|e| NetworkError::Unreachable(format!("decrypt: {e}")))?;
    }
    if opts.compression_level.is_some() {
        payload = compression::decompress(&payload)
            .map_err(|e| NetworkError::Unreachable(format!("decompress: {e}")))?;
    }

    let envelope: Envelope = bincode::deserialize(&payload)
        .map_err(|e| NetworkError::Unreachable(format!("deserialize: {e}")))?;
    Ok(Some(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::primitives::{keypair_generate, sign};
    use crate::transport::message::{Envelope, Payload};

    fn sample_envelope() -> Envelope {
        let (sk, pk) = keypair_generate();
        let payload = Payload::Ping { nonce: 1 };
        let bytes = Envelope::signing_bytes(&pk.to_bytes(), 1, 1, &payload);
        let signature = sign(&sk, &bytes);
        Envelope {
            sender: pk.to_bytes(),
            timestamp_ms: 1,
            nonce: 1,
            payload,
            signature,
        }
    }

    #[tokio::test]
    async fn roundtrips_plain() {
        let envelope = sample_envelope();
        let mut buf = Vec::new();
        write_envelope(&mut buf, &envelope, &WireOptions::default())
            .await
            .unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let read = read_envelope(&mut cursor, &WireOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.nonce, envelope.nonce);
    }

    #[tokio::test]
    async fn roundtrips_with_compression() {
        let envelope = sample_envelope();
        let opts = WireOptions {
            compression_level: Some(6),
            cipher: None,
        };
        let mut buf = Vec::new();
        write_envelope(&mut buf, &envelope, &opts).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let read = read_envelope(&mut cursor, &opts).await.unwrap().unwrap();
        assert_eq!(read.nonce, envelope.nonce);
    }

    #[tokio::test]
    async fn eof_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_envelope(&mut cursor, &WireOptions::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let len = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut cursor = std::io::Cursor::new(len.to_vec());
        let result = read_envelope(&mut cursor, &WireOptions::default()).await;
        assert!(result.is_err());
    }
}
