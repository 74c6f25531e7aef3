//! A verifying client for append-only Merkle transparency logs.
//!
//! The log server is untrusted. [`LogClient`] keeps the last signed tree head
//! it has verified and checks every server response against it:
//!
//! - leaves come with RFC 6962 inclusion proofs under the trusted root,
//! - new roots must carry a valid signature and a consistency proof from the
//!   trusted root,
//! - anything that fails verification is rejected and the trusted root is
//!   left untouched.
//!
//! The server is reached through the [`LogTransport`] trait. [`HttpTransport`]
//! talks to a remote log service and [`memory::MemoryLog`] is an in-process
//! log for tests and demos.
//!
//! ```no_run
//! use mrkl_client::{Context, HttpTransport, LogClient};
//!
//! # async fn run(public_key: Vec<u8>) -> mrkl_client::Result<()> {
//! let transport = HttpTransport::new("http://localhost:3000")?;
//! let client = LogClient::with_defaults("audit", transport, public_key);
//! let ctx = Context::background();
//!
//! let root = client.update_root(&ctx).await?;
//! if root.tree_size() > 0 {
//!     let entry = client.get_by_index(&ctx, 0).await?;
//!     println!("first leaf: {:?}", entry.leaf_value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod encoding;
pub mod error;
pub mod hasher;
pub mod memory;
pub mod service;
pub mod signature;
pub mod transport;
pub mod tree;
pub mod types;
pub mod verifier;

pub use client::LogClient;
pub use config::{ClientOptions, Config, ConfigError};
pub use context::Context;
pub use error::{Error, Result};
pub use hasher::{HashProvider, Rfc6962Hasher};
pub use service::HttpTransport;
pub use signature::{Ed25519Verifier, SignatureVerifier};
pub use transport::{LogTransport, TransportError};
pub use tree::{MerkleTree, ProofError};
pub use types::{LeafEntry, SignedLogRoot, TrustedRoot};
pub use verifier::{MerkleVerifier, VerificationError};
