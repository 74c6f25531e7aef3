//! An in-memory log server implementing [`LogTransport`].
//!
//! Leaves are queued by `queue_leaf` and only become part of the tree when
//! [`MemoryLog::sequence`] is called, mirroring a server whose sequencer runs
//! in the background. Faults can be injected to exercise the client's checks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ed25519_dalek::SigningKey;
use parking_lot::RwLock;
use tracing::debug;

use crate::hasher::{HashProvider, Rfc6962Hasher};
use crate::signature::sign_root;
use crate::transport::{LogTransport, TransportError};
use crate::tree::{MerkleTree, ProofError};
use crate::types::{IndexedProof, LeafProof, SignedLogRoot};

/// Misbehaviour the in-memory log can be told to exhibit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Flip a bit in every inclusion proof served
    pub corrupt_inclusion_proofs: bool,
    /// Flip a bit in the inclusion proof of this one leaf only
    pub corrupt_inclusion_at: Option<u64>,
    /// Flip a bit in every consistency proof served
    pub corrupt_consistency_proofs: bool,
    /// Flip a bit in every root signature served
    pub corrupt_signatures: bool,
}

/// A combined state holding one log's tree and pending queue.
/// Readers always see the tree and published root from the same sequencing step.
struct LogState {
    tree: MerkleTree,
    pending: Vec<Vec<u8>>,
    signing_key: SigningKey,
    published: SignedLogRoot,
    faults: Faults,
}

impl LogState {
    fn new(signing_key: SigningKey) -> Self {
        let tree = MerkleTree::default();
        let published = sign_root(&signing_key, 0, tree.root(), now_nanos());
        Self {
            tree,
            pending: Vec::new(),
            signing_key,
            published,
            faults: Faults::default(),
        }
    }

    /// Rebuilds the tree from `values` and publishes a freshly signed root
    fn rebuild(&mut self, values: Vec<Vec<u8>>) {
        let mut tree = MerkleTree::default();
        for value in &values {
            tree.push_value(value);
        }
        self.tree = tree;
        self.publish();
    }

    fn publish(&mut self) {
        // strictly increasing, even when the clock is coarse
        let timestamp = now_nanos().max(self.published.timestamp_nanos + 1);
        self.published = sign_root(&self.signing_key, self.tree.len(), self.tree.root(), timestamp);
    }

    fn value(&self, index: u64) -> Result<&[u8], TransportError> {
        self.tree
            .value(index)
            .ok_or_else(|| TransportError::NotFound(format!("leaf {index}")))
    }

    fn leaf_proof(&self, index: u64, tree_size: u64) -> Result<LeafProof, TransportError> {
        let mut audit_path = self
            .tree
            .prove_inclusion_at(index, tree_size)
            .map_err(proof_error)?;
        if self.faults.corrupt_inclusion_proofs || self.faults.corrupt_inclusion_at == Some(index) {
            corrupt(&mut audit_path);
        }
        Ok(LeafProof {
            leaf_value: self.value(index)?.to_vec(),
            audit_path,
        })
    }
}

/// A set of in-memory logs keyed by name
#[derive(Default)]
pub struct MemoryLog {
    /// Map of log name to log state; each log has its own lock
    logs: DashMap<String, Arc<RwLock<LogState>>>,
    requests: AtomicU64,
    latency: RwLock<Duration>,
}

impl MemoryLog {
    /// Creates a server with no logs
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty log that signs its roots with `signing_key` and returns the public key.
    /// An existing log of the same name is replaced.
    pub fn create_log(&self, log_id: &str, signing_key: SigningKey) -> Vec<u8> {
        let public_key = signing_key.verifying_key().to_bytes().to_vec();
        self.logs
            .insert(log_id.to_string(), Arc::new(RwLock::new(LogState::new(signing_key))));
        public_key
    }

    /// Moves every queued leaf into the tree, in queue order, and publishes a new root.
    /// Leaves already in the tree are dropped, so a value is only ever sequenced once.
    ///
    /// Returns the number of leaves added.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the log does not exist.
    pub fn sequence(&self, log_id: &str) -> Result<u64, TransportError> {
        let log = self.log(log_id)?;
        let mut state = log.write();
        let pending = std::mem::take(&mut state.pending);
        let mut added = 0;
        for value in pending {
            let hash = Rfc6962Hasher.leaf_hash(&value);
            if state.tree.get_index(&hash).is_some() {
                continue;
            }
            state.tree.push_value(&value);
            added += 1;
        }
        if added > 0 {
            state.publish();
        }
        debug!(log_id, added, tree_size = state.tree.len(), "sequenced pending leaves");
        Ok(added)
    }

    /// Rolls the log back to its first `size` leaves and signs the shorter tree
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the log does not exist.
    pub fn truncate(&self, log_id: &str, size: u64) -> Result<(), TransportError> {
        let log = self.log(log_id)?;
        let mut state = log.write();
        let keep = usize::try_from(size).unwrap_or(usize::MAX).min(state.tree.items().len());
        let values = state.tree.items()[..keep].to_vec();
        state.rebuild(values);
        Ok(())
    }

    /// Rewrites the leaf at `index` and signs the resulting tree, which keeps its size
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the log or the leaf does not exist.
    pub fn rewrite_leaf(&self, log_id: &str, index: u64, value: &[u8]) -> Result<(), TransportError> {
        let log = self.log(log_id)?;
        let mut state = log.write();
        let mut values = state.tree.items().to_vec();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| values.get_mut(i))
            .ok_or_else(|| TransportError::NotFound(format!("leaf {index}")))?;
        *slot = value.to_vec();
        state.rebuild(values);
        Ok(())
    }

    /// Sets the faults a log exhibits from now on
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the log does not exist.
    pub fn set_faults(&self, log_id: &str, faults: Faults) -> Result<(), TransportError> {
        self.log(log_id)?.write().faults = faults;
        Ok(())
    }

    /// Delays every request by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Number of transport requests served so far
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of sequenced leaves in a log
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the log does not exist.
    pub fn tree_size(&self, log_id: &str) -> Result<u64, TransportError> {
        Ok(self.log(log_id)?.read().tree.len())
    }

    /// Number of queued leaves waiting to be sequenced
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the log does not exist.
    pub fn pending_count(&self, log_id: &str) -> Result<usize, TransportError> {
        Ok(self.log(log_id)?.read().pending.len())
    }

    fn log(&self, log_id: &str) -> Result<Arc<RwLock<LogState>>, TransportError> {
        self.logs
            .get(log_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::NotFound(format!("log '{log_id}'")))
    }

    /// Counts the request, applies latency and resolves the log
    async fn serve(&self, log_id: &str) -> Result<Arc<RwLock<LogState>>, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.log(log_id)
    }
}

#[async_trait]
impl LogTransport for MemoryLog {
    async fn queue_leaf(&self, log_id: &str, leaf_value: &[u8]) -> Result<(), TransportError> {
        let log = self.serve(log_id).await?;
        log.write().pending.push(leaf_value.to_vec());
        Ok(())
    }

    async fn get_leaf_by_index(
        &self,
        log_id: &str,
        index: u64,
        tree_size: u64,
    ) -> Result<LeafProof, TransportError> {
        let log = self.serve(log_id).await?;
        let state = log.read();
        state.leaf_proof(index, tree_size)
    }

    async fn get_leaves_in_range(
        &self,
        log_id: &str,
        start: u64,
        count: u64,
        tree_size: u64,
    ) -> Result<Vec<LeafProof>, TransportError> {
        let log = self.serve(log_id).await?;
        let state = log.read();
        let end = start
            .checked_add(count)
            .ok_or_else(|| TransportError::InvalidRequest("range overflows".into()))?;
        (start..end)
            .map(|index| state.leaf_proof(index, tree_size))
            .collect()
    }

    async fn get_latest_signed_root(&self, log_id: &str) -> Result<SignedLogRoot, TransportError> {
        let log = self.serve(log_id).await?;
        let state = log.read();
        let mut root = state.published.clone();
        if state.faults.corrupt_signatures {
            corrupt_bytes(&mut root.signature);
        }
        Ok(root)
    }

    async fn get_consistency_proof(
        &self,
        log_id: &str,
        size1: u64,
        size2: u64,
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        let log = self.serve(log_id).await?;
        let state = log.read();
        let mut proof = state
            .tree
            .prove_consistency_between(size1, size2)
            .map_err(proof_error)?;
        if state.faults.corrupt_consistency_proofs {
            corrupt(&mut proof);
        }
        Ok(proof)
    }

    async fn get_inclusion_proof_by_hash(
        &self,
        log_id: &str,
        leaf_hash: &[u8],
        tree_size: u64,
    ) -> Result<IndexedProof, TransportError> {
        let log = self.serve(log_id).await?;
        let state = log.read();
        let (leaf_index, mut audit_path) = state
            .tree
            .prove_inclusion_by_hash(leaf_hash, tree_size)
            .map_err(proof_error)?;
        if state.faults.corrupt_inclusion_proofs || state.faults.corrupt_inclusion_at == Some(leaf_index) {
            corrupt(&mut audit_path);
        }
        Ok(IndexedProof {
            leaf_index,
            audit_path,
        })
    }
}

fn proof_error(error: ProofError) -> TransportError {
    match error {
        ProofError::InvalidRootOrder { .. } => TransportError::InvalidRequest(error.to_string()),
        _ => TransportError::NotFound(error.to_string()),
    }
}

/// Damages a proof so that it can no longer verify
fn corrupt(proof: &mut Vec<Vec<u8>>) {
    match proof.first_mut() {
        Some(node) => corrupt_bytes(node),
        None => proof.push(vec![0; 32]),
    }
}

fn corrupt_bytes(bytes: &mut Vec<u8>) {
    match bytes.first_mut() {
        Some(byte) => *byte ^= 1,
        None => bytes.push(1),
    }
}

fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{Ed25519Verifier, SignatureVerifier};

    const LOG: &str = "test_log";

    fn memory_log() -> (MemoryLog, Vec<u8>) {
        let log = MemoryLog::new();
        let public_key = log.create_log(LOG, SigningKey::from_bytes(&[1; 32]));
        (log, public_key)
    }

    #[tokio::test]
    async fn test_queue_then_sequence() {
        let (log, _) = memory_log();
        for value in [&b"A"[..], b"B", b"A"] {
            log.queue_leaf(LOG, value).await.expect("queue succeeds");
        }
        assert_eq!(log.tree_size(LOG).expect("log exists"), 0);
        assert_eq!(log.pending_count(LOG).expect("log exists"), 3);

        // the duplicate "A" is dropped
        assert_eq!(log.sequence(LOG).expect("log exists"), 2);
        assert_eq!(log.tree_size(LOG).expect("log exists"), 2);
        assert_eq!(log.pending_count(LOG).expect("log exists"), 0);

        log.queue_leaf(LOG, b"B").await.expect("queue succeeds");
        assert_eq!(log.sequence(LOG).expect("log exists"), 0);
    }

    #[tokio::test]
    async fn test_roots_are_signed_and_advance() {
        let (log, public_key) = memory_log();
        let empty = log.get_latest_signed_root(LOG).await.expect("root exists");
        assert_eq!(empty.tree_size, 0);
        assert_eq!(empty.root_hash, Rfc6962Hasher.empty_root());

        log.queue_leaf(LOG, b"A").await.expect("queue succeeds");
        log.sequence(LOG).expect("log exists");
        let root = log.get_latest_signed_root(LOG).await.expect("root exists");
        assert_eq!(root.tree_size, 1);
        assert!(root.timestamp_nanos > empty.timestamp_nanos);
        assert!(Ed25519Verifier.verify(&public_key, &root.statement(), &root.signature));

        log.set_faults(LOG, Faults { corrupt_signatures: true, ..Faults::default() })
            .expect("log exists");
        let root = log.get_latest_signed_root(LOG).await.expect("root exists");
        assert!(!Ed25519Verifier.verify(&public_key, &root.statement(), &root.signature));
    }

    #[tokio::test]
    async fn test_unknown_log_and_leaf() {
        let (log, _) = memory_log();
        assert!(matches!(
            log.get_latest_signed_root("missing").await,
            Err(TransportError::NotFound(_))
        ));
        assert!(matches!(
            log.get_leaf_by_index(LOG, 0, 0).await,
            Err(TransportError::NotFound(_))
        ));
        assert!(matches!(
            log.get_consistency_proof(LOG, 1, 0).await,
            Err(TransportError::InvalidRequest(_))
        ));
        assert_eq!(log.request_count(), 3);
    }

    #[tokio::test]
    async fn test_truncate_and_rewrite() {
        let (log, _) = memory_log();
        for value in [&b"A"[..], b"B", b"C"] {
            log.queue_leaf(LOG, value).await.expect("queue succeeds");
        }
        log.sequence(LOG).expect("log exists");
        let before = log.get_latest_signed_root(LOG).await.expect("root exists");

        log.rewrite_leaf(LOG, 1, b"X").expect("leaf exists");
        let forked = log.get_latest_signed_root(LOG).await.expect("root exists");
        assert_eq!(forked.tree_size, 3);
        assert_ne!(forked.root_hash, before.root_hash);
        let leaf = log.get_leaf_by_index(LOG, 1, 3).await.expect("leaf exists");
        assert_eq!(leaf.leaf_value, b"X");

        log.truncate(LOG, 1).expect("log exists");
        assert_eq!(log.tree_size(LOG).expect("log exists"), 1);
        assert!(log.rewrite_leaf(LOG, 5, b"Y").is_err());
    }
}
