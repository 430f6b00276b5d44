//! Ed25519 signing/verification and SHA-256 hashing.

use crate::error::CryptoError;
use crate::types::{PublicKeyBytes, Signature64};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Generate a fresh Ed25519 keypair.
pub fn keypair_generate() -> (SigningKey, VerifyingKey) {
    let mut csprng = rand::rngs::OsRng;
    let sk = SigningKey::generate(&mut csprng);
    let pk = sk.verifying_key();
    (sk, pk)
}

/// Sign `msg` under `sk`, returning the raw 64-byte Ed25519 signature.
pub fn sign(sk: &SigningKey, msg: &[u8]) -> Signature64 {
    sk.sign(msg).to_bytes()
}

/// Verify a 64-byte Ed25519 signature over `msg` under `pk`.
pub fn verify(pk: &VerifyingKey, msg: &[u8], sig: &Signature64) -> bool {
    match ed25519_dalek::Signature::from_slice(sig) {
        Ok(sig) => pk.verify(msg, &sig).is_ok(),
        Err(_) => false,
    }
}

/// Decode 32 raw bytes into a `VerifyingKey`, rejecting non-canonical or
/// otherwise malformed public keys.
pub fn decode_public_key(bytes: &PublicKeyBytes) -> Result<VerifyingKey, CryptoError> {
    VerifyingKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidKey)
}

/// SHA-256 over the concatenation of an arbitrary sequence of byte slices.
///
/// Variadic-by-slice-of-slices, matching the spec's `hash(bytes…)` signature
/// without needing a macro: callers pass `&[a, b, c]`.
pub fn hash(parts: &[&[u8]]) -> crate::types::Hash256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
