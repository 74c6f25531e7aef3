use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::types::{encode_statement, SignedLogRoot};

/// Checks a signature made by the log over a signed root statement.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true only if `signature` is a valid signature of `statement` under `public_key`.
    /// Malformed keys or signatures are reported as invalid.
    fn verify(&self, public_key: &[u8], statement: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 signatures over the root statement
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &[u8], statement: &[u8], signature: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(statement, &signature).is_ok()
    }
}

/// Produces a signed root with an Ed25519 key. Used by log implementations.
#[must_use]
pub fn sign_root(
    key: &SigningKey,
    tree_size: u64,
    root_hash: Vec<u8>,
    timestamp_nanos: u64,
) -> SignedLogRoot {
    let statement = encode_statement(tree_size, &root_hash, timestamp_nanos);
    let signature = key.sign(&statement).to_bytes().to_vec();
    SignedLogRoot {
        tree_size,
        root_hash,
        timestamp_nanos,
        signature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[42; 32])
    }

    #[test]
    fn test_signed_root_verifies() {
        let key = key();
        let root = sign_root(&key, 5, vec![1; 32], 99);
        let public = key.verifying_key().to_bytes();
        assert!(Ed25519Verifier.verify(&public, &root.statement(), &root.signature));
    }

    #[test]
    fn test_tampered_root_fails() {
        let key = key();
        let mut root = sign_root(&key, 5, vec![1; 32], 99);
        let public = key.verifying_key().to_bytes();
        root.tree_size = 6;
        assert!(!Ed25519Verifier.verify(&public, &root.statement(), &root.signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let root = sign_root(&key(), 5, vec![1; 32], 99);
        let other = SigningKey::from_bytes(&[7; 32]).verifying_key().to_bytes();
        assert!(!Ed25519Verifier.verify(&other, &root.statement(), &root.signature));
    }

    #[test]
    fn test_malformed_inputs_fail() {
        let key = key();
        let root = sign_root(&key, 5, vec![1; 32], 99);
        let public = key.verifying_key().to_bytes();
        assert!(!Ed25519Verifier.verify(&public[..31], &root.statement(), &root.signature));
        assert!(!Ed25519Verifier.verify(&public, &root.statement(), &root.signature[..10]));
        assert!(!Ed25519Verifier.verify(&public, &root.statement(), &[]));
    }
}
