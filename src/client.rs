use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::ClientOptions;
use crate::context::Context;
use crate::encoding::to_base64;
use crate::error::{Error, Result};
use crate::hasher::{HashProvider, Rfc6962Hasher};
use crate::signature::{Ed25519Verifier, SignatureVerifier};
use crate::transport::{LogTransport, TransportError};
use crate::types::{LeafEntry, LeafProof, SignedLogRoot, TrustedRoot};
use crate::verifier::{verify_signature, MerkleVerifier};

/// A log client that verifies everything the server tells it.
///
/// The client holds the last root it verified. Reads are checked against a
/// snapshot of that root; [`LogClient::update_root`] is the only way it
/// changes, and it only moves forward along a verified consistency proof.
///
/// All methods take `&self`, so one client can be shared across tasks with an `Arc`.
pub struct LogClient<T, H = Rfc6962Hasher, V = Ed25519Verifier> {
    log_id: String,
    transport: T,
    merkle: MerkleVerifier<H>,
    signatures: V,
    public_key: Vec<u8>,
    /// `None` until the first successful root update
    trusted: RwLock<Option<TrustedRoot>>,
    options: ClientOptions,
}

impl<T: LogTransport> LogClient<T> {
    /// A client for an RFC 6962 / Ed25519 log with no trusted root yet
    pub fn with_defaults(log_id: impl Into<String>, transport: T, public_key: impl Into<Vec<u8>>) -> Self {
        Self::new(log_id, transport, Rfc6962Hasher, Ed25519Verifier, public_key)
    }
}

impl<T, H, V> LogClient<T, H, V>
where
    T: LogTransport,
    H: HashProvider,
    V: SignatureVerifier,
{
    /// Creates a client with no trusted root. Reads fail with `NotFound` until
    /// [`LogClient::update_root`] succeeds.
    pub fn new(
        log_id: impl Into<String>,
        transport: T,
        hasher: H,
        verifier: V,
        public_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            log_id: log_id.into(),
            transport,
            merkle: MerkleVerifier::new(hasher),
            signatures: verifier,
            public_key: public_key.into(),
            trusted: RwLock::new(None),
            options: ClientOptions::default(),
        }
    }

    /// Creates a client that starts from a previously trusted root, typically one
    /// persisted with [`TrustedRoot::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignature` if `root` is not signed by `public_key`.
    pub fn with_root(
        log_id: impl Into<String>,
        transport: T,
        hasher: H,
        verifier: V,
        public_key: impl Into<Vec<u8>>,
        root: SignedLogRoot,
    ) -> Result<Self> {
        let client = Self::new(log_id, transport, hasher, verifier, public_key);
        verify_signature(&client.signatures, &client.public_key, &root)
            .map_err(|e| client.rejected(Error::InvalidSignature(e)))?;
        *client.trusted.write() = Some(TrustedRoot::verified(root));
        Ok(client)
    }

    /// Replaces the client's options
    #[must_use]
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// The log this client reads and writes
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// The underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the currently trusted root, `None` before the first update. Never does I/O.
    pub fn root(&self) -> Option<TrustedRoot> {
        self.trusted.read().clone()
    }

    /// Submits `data` for sequencing and returns once the server accepts it.
    ///
    /// This does not wait for the leaf to be sequenced; use
    /// [`LogClient::add_leaf_and_wait`] or poll the read methods for that.
    ///
    /// # Errors
    ///
    /// - `DeadlineExceeded` / `Cancelled` if `ctx` ends before the server acknowledges,
    /// - `Transport` if the server rejects the leaf.
    pub async fn add_leaf(&self, ctx: &Context, data: &[u8]) -> Result<()> {
        ctx.run(self.transport.queue_leaf(&self.log_id, data)).await?;
        debug!(log_id = %self.log_id, bytes = data.len(), "leaf queued");
        Ok(())
    }

    /// Submits `data` and waits until it is provably included under a trusted root.
    ///
    /// Between attempts the client sleeps for the configured poll interval. While
    /// the server has not sequenced the leaf this only ends with the context, so
    /// `DeadlineExceeded` is the expected result for a short deadline.
    ///
    /// # Errors
    ///
    /// - `DeadlineExceeded` / `Cancelled` when `ctx` ends first,
    /// - any error of [`LogClient::update_root`] or [`LogClient::verify_inclusion_by_hash`]
    ///   other than the leaf not being found yet.
    pub async fn add_leaf_and_wait(&self, ctx: &Context, data: &[u8]) -> Result<LeafEntry> {
        self.add_leaf(ctx, data).await?;
        let leaf_hash = self.merkle.hasher().leaf_hash(data);
        loop {
            self.update_root(ctx).await?;
            match self.verify_inclusion_by_hash(ctx, &leaf_hash).await {
                Ok(index) => {
                    return Ok(LeafEntry {
                        index,
                        leaf_value: data.to_vec(),
                        leaf_hash,
                    })
                }
                Err(Error::HashNotFound { tree_size }) => {
                    debug!(log_id = %self.log_id, tree_size, "leaf not sequenced yet");
                }
                Err(e) => return Err(e),
            }
            ctx.sleep(self.options.poll_interval).await?;
        }
    }

    /// Fetches the leaf at `index` and verifies it against the trusted root.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `index` is outside the trusted tree (no request is made),
    ///   or the server has no such leaf,
    /// - `InvalidInclusionProof` if the server's proof does not verify,
    /// - `DeadlineExceeded` / `Cancelled` / `Transport` from the request.
    pub async fn get_by_index(&self, ctx: &Context, index: u64) -> Result<LeafEntry> {
        let trusted = self.root();
        let tree_size = trusted.as_ref().map_or(0, TrustedRoot::tree_size);
        let Some(trusted) = trusted.filter(|_| index < tree_size) else {
            return Err(Error::NotFound { index, tree_size });
        };

        debug!(log_id = %self.log_id, index, tree_size, "fetching leaf");
        let leaf = ctx
            .run(self.transport.get_leaf_by_index(&self.log_id, index, tree_size))
            .await
            .map_err(|e| leaf_not_found(e, index, tree_size))?;
        self.verify_leaf(&trusted, index, leaf)
    }

    /// Fetches `count` leaves starting at `start` in one request and verifies each one.
    ///
    /// Either every leaf verifies and all are returned, or none are.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the range extends past the trusted tree (no request is made),
    /// - `MalformedResponse` if the server returns the wrong number of leaves,
    /// - `InvalidInclusionProof` if any leaf's proof does not verify,
    /// - `DeadlineExceeded` / `Cancelled` / `Transport` from the request.
    pub async fn list_by_index(&self, ctx: &Context, start: u64, count: u64) -> Result<Vec<LeafEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let trusted = self.root();
        let tree_size = trusted.as_ref().map_or(0, TrustedRoot::tree_size);
        let in_range = start.checked_add(count).is_some_and(|end| end <= tree_size);
        let Some(trusted) = trusted.filter(|_| in_range) else {
            return Err(Error::NotFound {
                index: start.max(tree_size),
                tree_size,
            });
        };

        debug!(log_id = %self.log_id, start, count, tree_size, "fetching leaf range");
        let leaves = ctx
            .run(
                self.transport
                    .get_leaves_in_range(&self.log_id, start, count, tree_size),
            )
            .await
            .map_err(|e| leaf_not_found(e, start, tree_size))?;
        if leaves.len() as u64 != count {
            return Err(self.rejected(Error::MalformedResponse(format!(
                "asked for {count} leaves from {start}, got {}",
                leaves.len()
            ))));
        }

        leaves
            .into_iter()
            .zip(start..)
            .map(|(leaf, index)| self.verify_leaf(&trusted, index, leaf))
            .collect()
    }

    /// Proves that a leaf with hash `leaf_hash` is included under the trusted root and returns its index.
    ///
    /// # Errors
    ///
    /// - `HashNotFound` if there is no trusted root or the server does not know the leaf,
    /// - `InvalidInclusionProof` if the server's proof does not verify,
    /// - `DeadlineExceeded` / `Cancelled` / `Transport` from the request.
    pub async fn verify_inclusion_by_hash(&self, ctx: &Context, leaf_hash: &[u8]) -> Result<u64> {
        let Some(trusted) = self.root().filter(|root| root.tree_size() > 0) else {
            return Err(Error::HashNotFound { tree_size: 0 });
        };
        let tree_size = trusted.tree_size();

        let proof = ctx
            .run(
                self.transport
                    .get_inclusion_proof_by_hash(&self.log_id, leaf_hash, tree_size),
            )
            .await
            .map_err(|e| match e {
                Error::Transport(TransportError::NotFound(_)) => Error::HashNotFound { tree_size },
                other => other,
            })?;

        self.merkle
            .verify_inclusion(
                leaf_hash,
                proof.leaf_index,
                tree_size,
                trusted.root_hash(),
                &proof.audit_path,
            )
            .map_err(|e| self.rejected(Error::InvalidInclusionProof(e)))?;
        Ok(proof.leaf_index)
    }

    /// Fetches the latest signed root and, if it verifies, makes it the trusted root.
    ///
    /// A root no larger than the trusted one leaves the state as it is and returns
    /// the trusted root; a root of the same size with a different hash is a fork and
    /// is rejected. If another update advanced the trusted root past the fetched one
    /// while this call was in flight, the fetched root must be a prefix of the new
    /// trusted root and the new trusted root is returned.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the root is not signed by the log's key,
    /// - `InvalidConsistencyProof` if the tree shrank below the root trusted when the
    ///   call started, forked, or a proof does not verify,
    /// - `DeadlineExceeded` / `Cancelled` / `Transport` from the requests.
    pub async fn update_root(&self, ctx: &Context) -> Result<TrustedRoot> {
        let initial = self.root();
        let latest = ctx
            .run(self.transport.get_latest_signed_root(&self.log_id))
            .await?;
        debug!(
            log_id = %self.log_id,
            tree_size = latest.tree_size,
            root = %to_base64(&latest.root_hash),
            "fetched signed root"
        );
        verify_signature(&self.signatures, &self.public_key, &latest)
            .map_err(|e| self.rejected(Error::InvalidSignature(e)))?;

        let mut held = self.root();
        loop {
            if let Some(current) = &held {
                if latest.tree_size <= current.tree_size() {
                    return self.check_not_newer(ctx, initial.as_ref(), current, &latest).await;
                }
                self.check_consistency(
                    ctx,
                    (current.tree_size(), current.root_hash()),
                    (latest.tree_size, latest.root_hash.as_slice()),
                )
                .await?;
            }
            match self.swap_if_unchanged(&held, &latest) {
                Ok(accepted) => return Ok(accepted),
                Err(now) => {
                    debug!(log_id = %self.log_id, "trusted root moved during update, verifying again");
                    held = now;
                }
            }
        }
    }

    /// Handles a fetched root that is not larger than the trusted one.
    ///
    /// Against the root held when the update started, a smaller size is a rollback
    /// and an equal size must match. A root that only fell behind because the
    /// trusted root advanced concurrently is checked as a prefix of `current`.
    async fn check_not_newer(
        &self,
        ctx: &Context,
        initial: Option<&TrustedRoot>,
        current: &TrustedRoot,
        latest: &SignedLogRoot,
    ) -> Result<TrustedRoot> {
        match initial {
            Some(initial) if latest.tree_size <= initial.tree_size() => {
                self.merkle
                    .verify_consistency(
                        initial.tree_size(),
                        initial.root_hash(),
                        latest.tree_size,
                        &latest.root_hash,
                        &[],
                    )
                    .map_err(|e| self.rejected(Error::InvalidConsistencyProof(e)))?;
            }
            _ => {
                debug!(
                    log_id = %self.log_id,
                    fetched = latest.tree_size,
                    trusted = current.tree_size(),
                    "trusted root advanced past the fetched root"
                );
                self.check_consistency(
                    ctx,
                    (latest.tree_size, latest.root_hash.as_slice()),
                    (current.tree_size(), current.root_hash()),
                )
                .await?;
            }
        }
        Ok(current.clone())
    }

    /// Verifies that the tree `old` is a prefix of the tree `new`, fetching a proof when one is needed
    async fn check_consistency(&self, ctx: &Context, old: (u64, &[u8]), new: (u64, &[u8])) -> Result<()> {
        let ((size1, root1), (size2, root2)) = (old, new);
        let proof = if size1 == 0 || size1 == size2 {
            Vec::new()
        } else {
            debug!(log_id = %self.log_id, from = size1, to = size2, "fetching consistency proof");
            ctx.run(self.transport.get_consistency_proof(&self.log_id, size1, size2))
                .await?
        };
        self.merkle
            .verify_consistency(size1, root1, size2, root2, &proof)
            .map_err(|e| self.rejected(Error::InvalidConsistencyProof(e)))
    }

    /// Installs `latest` if the trusted root is still `held`; otherwise returns what it is now
    fn swap_if_unchanged(
        &self,
        held: &Option<TrustedRoot>,
        latest: &SignedLogRoot,
    ) -> std::result::Result<TrustedRoot, Option<TrustedRoot>> {
        let mut trusted = self.trusted.write();
        if *trusted != *held {
            return Err(trusted.clone());
        }
        let accepted = TrustedRoot::verified(latest.clone());
        *trusted = Some(accepted.clone());
        info!(
            log_id = %self.log_id,
            from = held.as_ref().map_or(0, TrustedRoot::tree_size),
            to = accepted.tree_size(),
            "trusted root advanced"
        );
        Ok(accepted)
    }

    fn verify_leaf(&self, trusted: &TrustedRoot, index: u64, leaf: LeafProof) -> Result<LeafEntry> {
        let leaf_hash = self.merkle.hasher().leaf_hash(&leaf.leaf_value);
        self.merkle
            .verify_inclusion(
                &leaf_hash,
                index,
                trusted.tree_size(),
                trusted.root_hash(),
                &leaf.audit_path,
            )
            .map_err(|e| self.rejected(Error::InvalidInclusionProof(e)))?;
        Ok(LeafEntry {
            index,
            leaf_value: leaf.leaf_value,
            leaf_hash,
        })
    }

    fn rejected(&self, error: Error) -> Error {
        warn!(log_id = %self.log_id, %error, "rejected server response");
        error
    }
}

fn leaf_not_found(error: Error, index: u64, tree_size: u64) -> Error {
    match error {
        Error::Transport(TransportError::NotFound(_)) => Error::NotFound { index, tree_size },
        other => other,
    }
}
