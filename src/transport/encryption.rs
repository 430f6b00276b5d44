//! Optional session encryption (§4.6): an X25519 Diffie-Hellman exchange
//! derives a shared secret, SHA-256 of which becomes an AES-256-GCM key.
//! Each frame is prefixed with a fresh random 12-byte nonce.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("AES-GCM operation failed")]
    Cipher,
}

#[derive(Clone)]
pub struct SessionCipher {
    key: [u8; 32],
}

impl SessionCipher {
    /// Derive a session cipher from a completed ECDH exchange.
    pub fn from_shared_secret(shared: &x25519_dalek::SharedSecret) -> Self {
        let key: [u8; 32] = Sha256::digest(shared.as_bytes()).into();
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| EncryptionError::Cipher)?;
        let mut nonce_bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EncryptionError::Cipher)?;

        let mut out = Vec::with_capacity(12 + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, framed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if framed.len() < 12 {
            return Err(EncryptionError::Cipher);
        }
        let (nonce_bytes, ciphertext) = framed.split_at(12);
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| EncryptionError::Cipher)?;
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| EncryptionError::Cipher)
    }
}

/// Generate an ephemeral X25519 keypair for one handshake.
pub fn generate_ephemeral() -> (EphemeralSecret, PublicKey) {
    let secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let public = PublicKey::from(&secret);
    (secret, public)
}

/// Derive a node's static X25519 keypair from its Ed25519 seed, so peers
/// can perform a repeatable (non-ephemeral) exchange when reconnecting.
pub fn static_from_seed(seed: &[u8; 32]) -> (StaticSecret, PublicKey) {
    let secret = StaticSecret::from(*seed);
    let public = PublicKey::from(&secret);
    (secret, public)
}
