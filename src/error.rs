//! Error types returned by the verifying client.

use crate::transport::TransportError;
use crate::verifier::VerificationError;

/// Errors returned by [`crate::LogClient`] operations.
///
/// Any error from a read or root update means the data must not be trusted.
/// The three `Invalid*` variants mean the server produced something that does
/// not verify; the trusted root is never changed when they are returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The index is outside the trusted tree, or the server has no such leaf
    #[error("leaf {index} not found in trusted tree of size {tree_size}")]
    NotFound { index: u64, tree_size: u64 },

    /// The trusted tree is empty, or the server does not know a leaf with this hash
    #[error("leaf hash not found in trusted tree of size {tree_size}")]
    HashNotFound { tree_size: u64 },

    /// An inclusion proof returned by the server did not verify
    #[error("invalid inclusion proof: {0}")]
    InvalidInclusionProof(#[source] VerificationError),

    /// A consistency proof (or the size/root relation it covers) did not verify
    #[error("invalid consistency proof: {0}")]
    InvalidConsistencyProof(#[source] VerificationError),

    /// A signed root did not verify under the log's public key
    #[error("invalid root signature: {0}")]
    InvalidSignature(#[source] VerificationError),

    /// The server answered with a response the client cannot use
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The caller's deadline passed before the operation completed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// The transport failed; passed through unchanged
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// True for the failures that indicate a misbehaving or compromised log
    #[must_use]
    pub const fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidInclusionProof(_) | Self::InvalidConsistencyProof(_) | Self::InvalidSignature(_)
        )
    }
}

/// Result alias for client operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
