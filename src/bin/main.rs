//! Command line verifying client for a remote merkle log.
//!
//! Settings come from the environment (and `.env`), see [`mrkl_client::Config`];
//! flags override them. `MRKL_ROOT_FILE` and `MRKL_TIMEOUT_SECS` only exist for
//! this binary and stand in for `--root-file` and `--timeout`.
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use mrkl_client::config::parse_public_key;
use mrkl_client::encoding::to_base64;
use mrkl_client::{
    Config, Context, Ed25519Verifier, HttpTransport, LeafEntry, LogClient, Rfc6962Hasher, TrustedRoot,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mrkl-client", version, about = "Verifying client for a merkle transparency log")]
struct Cli {
    /// Base URL of the log service
    #[arg(long, global = true)]
    server: Option<String>,

    /// Name of the log
    #[arg(long, global = true)]
    log: Option<String>,

    /// Base64 Ed25519 key the log signs its roots with
    #[arg(long, global = true)]
    public_key: Option<String>,

    /// File holding the trusted root between runs; created on first use
    #[arg(long, global = true, env = "MRKL_ROOT_FILE")]
    root_file: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, global = true, env = "MRKL_TIMEOUT_SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch, verify and print the latest root
    Root,
    /// Fetch and verify one leaf
    Get { index: u64 },
    /// Fetch and verify a range of leaves
    List { start: u64, count: u64 },
    /// Queue a leaf
    Add {
        data: String,
        /// Wait until the leaf is provably included
        #[arg(long)]
        wait: bool,
    },
    /// Keep checking that the log only grows by appending
    Watch {
        /// Seconds between checks
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
}

type HttpClient = LogClient<HttpTransport, Rfc6962Hasher, Ed25519Verifier>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = merged_config(&cli)?;
    let client = build_client(&config, cli.root_file.as_deref())?;
    let ctx = match cli.timeout {
        Some(secs) => Context::with_timeout(Duration::from_secs(secs)),
        None => Context::background(),
    };

    let result = run(&client, &ctx, cli.command).await;
    if let (Some(path), Some(root)) = (cli.root_file.as_deref(), client.root()) {
        save_root(path, &root)?;
    }
    result
}

async fn run(client: &HttpClient, ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Root => {
            let root = client.update_root(ctx).await?;
            print_root(&root);
        }
        Command::Get { index } => {
            client.update_root(ctx).await?;
            print_entry(&client.get_by_index(ctx, index).await?);
        }
        Command::List { start, count } => {
            client.update_root(ctx).await?;
            for entry in client.list_by_index(ctx, start, count).await? {
                print_entry(&entry);
            }
        }
        Command::Add { data, wait } => {
            if wait {
                let entry = client.add_leaf_and_wait(ctx, data.as_bytes()).await?;
                println!("included:");
                print_entry(&entry);
            } else {
                client.add_leaf(ctx, data.as_bytes()).await?;
                println!("queued {} bytes", data.len());
            }
        }
        Command::Watch { interval } => watch(client, ctx, Duration::from_secs(interval)).await?,
    }
    Ok(())
}

/// Polls the log and verifies every new root against the previous one.
/// Returns on the first verification failure or when the context ends.
async fn watch(client: &HttpClient, ctx: &Context, interval: Duration) -> Result<()> {
    let mut last = client.update_root(ctx).await?;
    info!(log_id = client.log_id(), root = %last, "watching log");
    loop {
        ctx.sleep(interval).await?;
        match client.update_root(ctx).await {
            Ok(root) if root.tree_size() > last.tree_size() => {
                println!(
                    "{} grew {} -> {}, consistency verified",
                    client.log_id(),
                    last.tree_size(),
                    root.tree_size()
                );
                last = root;
            }
            Ok(_) => {}
            Err(e) if e.is_verification_failure() => {
                error!(log_id = client.log_id(), error = %e, "log misbehaved");
                return Err(e.into());
            }
            Err(e) => error!(log_id = client.log_id(), error = %e, "check failed, retrying"),
        }
    }
}

fn merged_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(server) = &cli.server {
        config.server_url = server.trim_end_matches('/').to_string();
    }
    if let Some(log) = &cli.log {
        config.log_name = Some(log.clone());
    }
    if let Some(key) = &cli.public_key {
        config.public_key = Some(parse_public_key(key)?);
    }
    Ok(config)
}

fn build_client(config: &Config, root_file: Option<&Path>) -> Result<HttpClient> {
    let transport = HttpTransport::from_config(config)?;
    let log_name = config.require_log_name()?;
    let public_key = config.require_public_key()?;

    let client = match root_file.filter(|path| path.exists()) {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading trusted root from {}", path.display()))?;
            let root = TrustedRoot::from_bytes(&bytes)
                .with_context(|| format!("parsing trusted root in {}", path.display()))?;
            LogClient::with_root(log_name, transport, Rfc6962Hasher, Ed25519Verifier, public_key, root)?
        }
        None => LogClient::with_defaults(log_name, transport, public_key),
    };
    Ok(client.with_options(config.client_options()))
}

fn save_root(path: &Path, root: &TrustedRoot) -> Result<()> {
    let bytes = root.to_bytes().context("encoding trusted root")?;
    std::fs::write(path, bytes).with_context(|| format!("writing trusted root to {}", path.display()))
}

fn print_root(root: &TrustedRoot) {
    println!("tree_size: {}", root.tree_size());
    println!("root_hash: {}", to_base64(root.root_hash()));
    println!("timestamp: {}", root.timestamp().to_rfc3339());
}

fn print_entry(entry: &LeafEntry) {
    println!(
        "[{}] {} (hash {})",
        entry.index,
        String::from_utf8_lossy(&entry.leaf_value),
        to_base64(&entry.leaf_hash)
    );
}
