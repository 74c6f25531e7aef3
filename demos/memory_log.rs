//! Example: verifying client against an in-process log
//!
//! Appends a few leaves, reads them back with proofs, then makes the log
//! rewrite history and shows the client refusing the forked root.
//!
//! Usage:
//!   cargo run --example memory_log
#![allow(clippy::print_stdout)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ed25519_dalek::SigningKey;
use mrkl_client::memory::MemoryLog;
use mrkl_client::{Context, LogClient};

const LOG: &str = "example_log";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let server = Arc::new(MemoryLog::new());
    let public_key = server.create_log(LOG, SigningKey::from_bytes(&[7; 32]));
    let client = LogClient::with_defaults(LOG, Arc::clone(&server), public_key);
    let ctx = Context::with_timeout(Duration::from_secs(5));

    let root = client.update_root(&ctx).await?;
    println!("initial root: {root}");

    for value in ["alice", "bob", "carol"] {
        client.add_leaf(&ctx, value.as_bytes()).await?;
    }
    server.sequence(LOG)?;

    let root = client.update_root(&ctx).await?;
    println!("after sequencing: {root}");
    for entry in client.list_by_index(&ctx, 0, root.tree_size()).await? {
        println!("  [{}] {}", entry.index, String::from_utf8_lossy(&entry.leaf_value));
    }

    println!("\nrewriting leaf 1 on the server...");
    server.rewrite_leaf(LOG, 1, b"mallory")?;
    match client.update_root(&ctx).await {
        Ok(root) => println!("unexpectedly accepted {root}"),
        Err(e) => println!("rejected: {e}"),
    }
    if let Some(root) = client.root() {
        println!("still trusting: {root}");
    }
    Ok(())
}
