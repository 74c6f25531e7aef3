use async_trait::async_trait;

use crate::types::{IndexedProof, LeafProof, SignedLogRoot};

/// Errors reported by a log transport. The client passes these through untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server has no such log, leaf or tree size
    #[error("not found: {0}")]
    NotFound(String),
    /// The server rejected the request as invalid
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The request could not be delivered or the response could not be read
    #[error("request failed: {0}")]
    Request(String),
    /// The server failed while handling the request
    #[error("server error: {0}")]
    Server(String),
}

/// The RPC surface of a log server, as seen from the verifying client.
///
/// Nothing a transport returns is trusted; every response is checked by the
/// client before it is used.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Submits a leaf for eventual sequencing. Success only means the server accepted it.
    async fn queue_leaf(&self, log_id: &str, leaf_value: &[u8]) -> Result<(), TransportError>;

    /// Fetches the leaf at `index` with its audit path in the tree of `tree_size` leaves
    async fn get_leaf_by_index(
        &self,
        log_id: &str,
        index: u64,
        tree_size: u64,
    ) -> Result<LeafProof, TransportError>;

    /// Fetches `count` leaves starting at `start`, each with its audit path in the tree of `tree_size` leaves
    async fn get_leaves_in_range(
        &self,
        log_id: &str,
        start: u64,
        count: u64,
        tree_size: u64,
    ) -> Result<Vec<LeafProof>, TransportError>;

    /// Fetches the server's latest signed tree head
    async fn get_latest_signed_root(&self, log_id: &str) -> Result<SignedLogRoot, TransportError>;

    /// Fetches the proof that the tree of `size2` leaves extends the tree of `size1` leaves
    async fn get_consistency_proof(
        &self,
        log_id: &str,
        size1: u64,
        size2: u64,
    ) -> Result<Vec<Vec<u8>>, TransportError>;

    /// Looks a leaf up by its hash and returns its index and audit path in the tree of `tree_size` leaves
    async fn get_inclusion_proof_by_hash(
        &self,
        log_id: &str,
        leaf_hash: &[u8],
        tree_size: u64,
    ) -> Result<IndexedProof, TransportError>;
}

#[async_trait]
impl<T: LogTransport + ?Sized> LogTransport for std::sync::Arc<T> {
    async fn queue_leaf(&self, log_id: &str, leaf_value: &[u8]) -> Result<(), TransportError> {
        (**self).queue_leaf(log_id, leaf_value).await
    }

    async fn get_leaf_by_index(
        &self,
        log_id: &str,
        index: u64,
        tree_size: u64,
    ) -> Result<LeafProof, TransportError> {
        (**self).get_leaf_by_index(log_id, index, tree_size).await
    }

    async fn get_leaves_in_range(
        &self,
        log_id: &str,
        start: u64,
        count: u64,
        tree_size: u64,
    ) -> Result<Vec<LeafProof>, TransportError> {
        (**self).get_leaves_in_range(log_id, start, count, tree_size).await
    }

    async fn get_latest_signed_root(&self, log_id: &str) -> Result<SignedLogRoot, TransportError> {
        (**self).get_latest_signed_root(log_id).await
    }

    async fn get_consistency_proof(
        &self,
        log_id: &str,
        size1: u64,
        size2: u64,
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        (**self).get_consistency_proof(log_id, size1, size2).await
    }

    async fn get_inclusion_proof_by_hash(
        &self,
        log_id: &str,
        leaf_hash: &[u8],
        tree_size: u64,
    ) -> Result<IndexedProof, TransportError> {
        (**self)
            .get_inclusion_proof_by_hash(log_id, leaf_hash, tree_size)
            .await
    }
}
