//! The local node's keypair: a single-owner, read-only handle.
//!
//! The raw secret bytes never leave this module. Callers get capabilities
//! (`sign`, `vrf_evaluate`) instead of key material.

use crate::crypto::{primitives, vrf};
use crate::error::ConfigError;
use crate::types::{PublicKeyBytes, Signature64};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

pub struct NodeIdentity {
    sk: SigningKey,
    pk: VerifyingKey,
}

impl NodeIdentity {
    /// Load the node's keypair from `path`, generating and persisting a
    /// fresh one on first run.
    pub fn load_or_generate(path: &Path) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        }

        if path.exists() {
            let bytes = fs::read(path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            if bytes.len() != 32 {
                return Err(ConfigError::InvalidValue {
                    field: "node_key_path",
                    reason: format!("expected a 32-byte seed, found {} bytes", bytes.len()),
                });
            }
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            let sk = SigningKey::from_bytes(&seed);
            let pk = sk.verifying_key();
            return Ok(Self { sk, pk });
        }

        let (sk, pk) = primitives::keypair_generate();
        let seed = Zeroizing::new(sk.to_bytes());
        fs::write(path, seed.as_slice()).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(path, perms);
        }
        Ok(Self { sk, pk })
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.pk
    }

    pub fn public_key_bytes(&self) -> PublicKeyBytes {
        self.pk.to_bytes()
    }

    pub fn sign(&self, msg: &[u8]) -> Signature64 {
        primitives::sign(&self.sk, msg)
    }

    pub fn vrf_evaluate(&self, input: &[u8]) -> ([u8; 32], [u8; 64]) {
        vrf::vrf_evaluate(&self.sk, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_and_persists_on_first_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node.key");

        let id1 = NodeIdentity::load_or_generate(&path).unwrap();
        let id2 = NodeIdentity::load_or_generate(&path).unwrap();

        assert_eq!(id1.public_key_bytes(), id2.public_key_bytes());
    }

    #[test]
    fn rejects_malformed_seed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node.key");
        std::fs::write(&path, b"too short").unwrap();

        assert!(NodeIdentity::load_or_generate(&path).is_err());
    }
}
