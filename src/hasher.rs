use sha2::{Digest, Sha256};

/// Domain separation prefix for leaf hashes (RFC 6962 §2.1)
pub const LEAF_HASH_PREFIX: u8 = 0x00;
/// Domain separation prefix for interior node hashes (RFC 6962 §2.1)
pub const NODE_HASH_PREFIX: u8 = 0x01;
/// SHA-256 hash size in bytes
pub const SHA256_SIZE: usize = 32;

/// Hash primitives used to build and check the log's merkle tree.
///
/// Implementations must be pure: the same input always produces the same digest.
pub trait HashProvider: Send + Sync {
    /// Hashes the raw bytes of a log entry into a leaf hash
    fn leaf_hash(&self, leaf: &[u8]) -> Vec<u8>;

    /// Combines two child hashes into their parent hash
    fn node_hash(&self, left: &[u8], right: &[u8]) -> Vec<u8>;

    /// Root hash of a tree with no leaves
    fn empty_root(&self) -> Vec<u8>;

    /// Size in bytes of every digest this provider produces
    fn size(&self) -> usize;
}

/// The Certificate Transparency hasher: SHA-256 with leaf/node prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc6962Hasher;

impl HashProvider for Rfc6962Hasher {
    fn leaf_hash(&self, leaf: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update([LEAF_HASH_PREFIX]);
        hasher.update(leaf);
        hasher.finalize().to_vec()
    }

    fn node_hash(&self, left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update([NODE_HASH_PREFIX]);
        hasher.update(left);
        hasher.update(right);
        hasher.finalize().to_vec()
    }

    fn empty_root(&self) -> Vec<u8> {
        Sha256::digest([]).to_vec()
    }

    fn size(&self) -> usize {
        SHA256_SIZE
    }
}

impl<H: HashProvider + ?Sized> HashProvider for std::sync::Arc<H> {
    fn leaf_hash(&self, leaf: &[u8]) -> Vec<u8> {
        (**self).leaf_hash(leaf)
    }

    fn node_hash(&self, left: &[u8], right: &[u8]) -> Vec<u8> {
        (**self).node_hash(left, right)
    }

    fn empty_root(&self) -> Vec<u8> {
        (**self).empty_root()
    }

    fn size(&self) -> usize {
        (**self).size()
    }
}
