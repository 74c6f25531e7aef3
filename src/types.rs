use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::{base64_bytes, base64_path, to_base64};

/// Version tag at the front of every signed root statement
pub const LOG_ROOT_VERSION: u16 = 1;

/// A signed tree head exactly as the server reported it. Nothing here has been checked yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLogRoot {
    /// Number of leaves committed to by `root_hash`
    pub tree_size: u64,
    /// Merkle root hash of the first `tree_size` leaves
    #[serde(with = "base64_bytes")]
    pub root_hash: Vec<u8>,
    /// Nanoseconds since the unix epoch at which the server produced this root
    pub timestamp_nanos: u64,
    /// Server signature over [`SignedLogRoot::statement`]
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignedLogRoot {
    /// Encodes the bytes the server signs.
    ///
    /// Layout (big-endian): `version:u16 | tree_size:u64 | hash_len:u8 | root_hash | timestamp_nanos:u64`.
    /// The length prefix saturates at 255 for longer root hashes. The whole hash is
    /// still written out and signed, so only the prefix stops describing it.
    #[must_use]
    pub fn statement(&self) -> Vec<u8> {
        encode_statement(self.tree_size, &self.root_hash, self.timestamp_nanos)
    }
}

pub(crate) fn encode_statement(tree_size: u64, root_hash: &[u8], timestamp_nanos: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 8 + 1 + root_hash.len() + 8);
    out.extend_from_slice(&LOG_ROOT_VERSION.to_be_bytes());
    out.extend_from_slice(&tree_size.to_be_bytes());
    out.push(u8::try_from(root_hash.len()).unwrap_or(u8::MAX));
    out.extend_from_slice(root_hash);
    out.extend_from_slice(&timestamp_nanos.to_be_bytes());
    out
}

/// A tree root this client has cryptographically accepted.
///
/// Values of this type only come out of a successful signature (and, when a
/// previous root was held, consistency) check, or from [`TrustedRoot::from_bytes`],
/// whose result is re-verified when handed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedRoot {
    tree_size: u64,
    #[serde(with = "base64_bytes")]
    root_hash: Vec<u8>,
    timestamp_nanos: u64,
    #[serde(with = "base64_bytes")]
    signature: Vec<u8>,
}

impl TrustedRoot {
    /// Promotes a signed root after it has passed verification
    pub(crate) fn verified(root: SignedLogRoot) -> Self {
        Self {
            tree_size: root.tree_size,
            root_hash: root.root_hash,
            timestamp_nanos: root.timestamp_nanos,
            signature: root.signature,
        }
    }

    /// Number of leaves in the trusted tree
    #[must_use]
    pub const fn tree_size(&self) -> u64 {
        self.tree_size
    }

    /// Root hash of the trusted tree
    #[must_use]
    pub fn root_hash(&self) -> &[u8] {
        &self.root_hash
    }

    /// Server timestamp in nanoseconds since the unix epoch
    #[must_use]
    pub const fn timestamp_nanos(&self) -> u64 {
        self.timestamp_nanos
    }

    /// Server timestamp as a UTC date
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let nanos = i64::try_from(self.timestamp_nanos).unwrap_or(i64::MAX);
        DateTime::from_timestamp_nanos(nanos)
    }

    /// The server's signature over this root
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns the signed statement this root was accepted from
    #[must_use]
    pub fn to_signed(&self) -> SignedLogRoot {
        SignedLogRoot {
            tree_size: self.tree_size,
            root_hash: self.root_hash.clone(),
            timestamp_nanos: self.timestamp_nanos,
            signature: self.signature.clone(),
        }
    }

    /// Serializes this root for the caller to persist
    ///
    /// # Errors
    ///
    /// Returns the serializer's error if the root cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Restores a persisted root.
    ///
    /// The result is still checked against the log's public key by
    /// `LogClient::with_root` before it is trusted.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` was not produced by [`TrustedRoot::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<SignedLogRoot, serde_json::Error> {
        let root: Self = serde_json::from_slice(bytes)?;
        Ok(root.to_signed())
    }
}

impl std::fmt::Display for TrustedRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "size={} root={}", self.tree_size, to_base64(&self.root_hash))
    }
}

/// A leaf read back from the log whose inclusion has been verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    /// Position of the leaf in the log
    pub index: u64,
    /// The raw leaf bytes
    pub leaf_value: Vec<u8>,
    /// Leaf hash computed locally from `leaf_value`
    pub leaf_hash: Vec<u8>,
}

/// A leaf as returned by the server, together with its audit path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafProof {
    /// The raw leaf bytes
    #[serde(with = "base64_bytes")]
    pub leaf_value: Vec<u8>,
    /// Sibling hashes from the leaf up to the root, bottom first
    #[serde(with = "base64_path")]
    pub audit_path: Vec<Vec<u8>>,
}

/// An inclusion proof located by leaf hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedProof {
    /// Position of the leaf in the log
    pub leaf_index: u64,
    /// Sibling hashes from the leaf up to the root, bottom first
    #[serde(with = "base64_path")]
    pub audit_path: Vec<Vec<u8>>,
}
