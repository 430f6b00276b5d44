//! The node's verifiable random function.
//!
//! This is **not** RFC-9381 ECVRF. It is a pragmatic construction:
//! `output = HMAC-SHA256(sk_bytes, input)`, `proof = Ed25519_Sign(sk, input
//! || output)`. It gives proof-of-knowledge (unforgeable, since Ed25519 is
//! unforgeable) but does not give strong output-pseudorandomness from the
//! public key alone — an implementer targeting production should swap in
//! RFC-9381 ECVRF behind this same interface; score derivation, proposer
//! selection, and verification downstream are unaffected by that swap.

use crate::error::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Evaluate the VRF for `input` under `sk`, returning `(output, proof)`.
pub fn vrf_evaluate(sk: &SigningKey, input: &[u8]) -> ([u8; 32], [u8; 64]) {
    let output = hmac_output(sk, input);

    let mut msg = Vec::with_capacity(input.len() + output.len());
    msg.extend_from_slice(input);
    msg.extend_from_slice(&output);
    let proof = sk.sign(&msg).to_bytes();

    (output, proof)
}

/// Verify that `proof` is a valid Ed25519 signature by `pk` over
/// `input || output`.
pub fn vrf_verify(
    pk: &VerifyingKey,
    input: &[u8],
    output: &[u8; 32],
    proof: &[u8; 64],
) -> Result<(), CryptoError> {
    let mut msg = Vec::with_capacity(input.len() + output.len());
    msg.extend_from_slice(input);
    msg.extend_from_slice(output);

    let sig = ed25519_dalek::Signature::from_bytes(proof);
    pk.verify(&msg, &sig)
        .map_err(|_| CryptoError::VrfVerificationFailed)
}

fn hmac_output(sk: &SigningKey, input: &[u8]) -> [u8; 32] {
    // SigningKey holds the 32-byte Ed25519 seed; used directly as the HMAC key.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(sk.to_bytes().as_slice())
        .expect("HMAC accepts keys of any length");
    mac.update(input);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::primitives::keypair_generate;

    #[test]
    fn evaluate_is_deterministic() {
        let (sk, _) = keypair_generate();
        let (o1, p1) = vrf_evaluate(&sk, b"round-7");
        let (o2, p2) = vrf_evaluate(&sk, b"round-7");
        assert_eq!(o1, o2);
        assert_eq!(p1, p2);
    }

    #[test]
    fn different_inputs_diverge() {
        let (sk, _) = keypair_generate();
        let (o1, _) = vrf_evaluate(&sk, b"round-7");
        let (o2, _) = vrf_evaluate(&sk, b"round-8");
        assert_ne!(o1, o2);
    }

    #[test]
    fn verify_accepts_genuine_proof() {
        let (sk, pk) = keypair_generate();
        let (output, proof) = vrf_evaluate(&sk, b"round-7");
        assert!(vrf_verify(&pk, b"round-7", &output, &proof).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_input() {
        let (sk, pk) = keypair_generate();
        let (output, proof) = vrf_evaluate(&sk, b"round-7");
        assert!(vrf_verify(&pk, b"round-8", &output, &proof).is_err());
    }

    #[test]
    fn verify_rejects_forged_output() {
        let (sk, pk) = keypair_generate();
        let (mut output, proof) = vrf_evaluate(&sk, b"round-7");
        output[0] ^= 0xFF;
        assert!(vrf_verify(&pk, b"round-7", &output, &proof).is_err());
    }
}
