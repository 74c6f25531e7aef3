//! Drives `HttpTransport` against an axum server backed by `MemoryLog`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use ed25519_dalek::SigningKey;
use mrkl_client::memory::MemoryLog;
use mrkl_client::service::{
    ApiResponse, ConsistencyProofResponse, ConsistencyQuery, InclusionProofResponse, InclusionQuery,
    LeafQuery, LeafResponse, LeavesResponse, QueueLeafRequest, QueueLeafResponse, RangeQuery,
    SignedRootResponse,
};
use mrkl_client::{
    ClientOptions, Context, Error, HashProvider, HttpTransport, LogClient, LogTransport, Rfc6962Hasher,
    TransportError,
};
use serde::Serialize;

const LOG: &str = "http_log";

type Shared = State<Arc<MemoryLog>>;
type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn reply<T: Serialize>(result: Result<T, TransportError>) -> Reply<T> {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(TransportError::NotFound(_)) => StatusCode::NOT_FOUND,
        Err(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(result.into()))
}

async fn queue_leaf(
    State(log): Shared,
    Path(log_name): Path<String>,
    Json(body): Json<QueueLeafRequest>,
) -> Reply<QueueLeafResponse> {
    let result = log.queue_leaf(&log_name, &body.leaf_value).await;
    reply(result.map(|()| QueueLeafResponse { log_name }))
}

async fn get_leaf(
    State(log): Shared,
    Path((log_name, index)): Path<(String, u64)>,
    Query(query): Query<LeafQuery>,
) -> Reply<LeafResponse> {
    let result = log.get_leaf_by_index(&log_name, index, query.tree_size).await;
    reply(result.map(|leaf| LeafResponse { log_name, leaf }))
}

async fn get_leaves(
    State(log): Shared,
    Path(log_name): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Reply<LeavesResponse> {
    let result = log
        .get_leaves_in_range(&log_name, query.start, query.count, query.tree_size)
        .await;
    reply(result.map(|leaves| LeavesResponse { log_name, leaves }))
}

async fn get_root(State(log): Shared, Path(log_name): Path<String>) -> Reply<SignedRootResponse> {
    let result = log.get_latest_signed_root(&log_name).await;
    reply(result.map(|root| SignedRootResponse { log_name, root }))
}

async fn get_consistency(
    State(log): Shared,
    Path(log_name): Path<String>,
    Query(query): Query<ConsistencyQuery>,
) -> Reply<ConsistencyProofResponse> {
    let result = log
        .get_consistency_proof(&log_name, query.first, query.second)
        .await;
    reply(result.map(|proof| ConsistencyProofResponse { log_name, proof }))
}

async fn get_proof(
    State(log): Shared,
    Path(log_name): Path<String>,
    Query(query): Query<InclusionQuery>,
) -> Reply<InclusionProofResponse> {
    let result = log
        .get_inclusion_proof_by_hash(&log_name, &query.hash, query.tree_size)
        .await;
    reply(result.map(|proof| InclusionProofResponse { log_name, proof }))
}

/// Serves `log` on an ephemeral port and returns its base URL
async fn spawn_server(log: Arc<MemoryLog>) -> Result<String> {
    let app = Router::new()
        .route("/logs/:log_name/leaves", get(get_leaves).post(queue_leaf))
        .route("/logs/:log_name/leaves/:index", get(get_leaf))
        .route("/logs/:log_name/root", get(get_root))
        .route("/logs/:log_name/consistency", get(get_consistency))
        .route("/logs/:log_name/proof", get(get_proof))
        .with_state(log);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });
    Ok(format!("http://{addr}"))
}

async fn setup() -> Result<(Arc<MemoryLog>, LogClient<HttpTransport>)> {
    let log = Arc::new(MemoryLog::new());
    let public_key = log.create_log(LOG, SigningKey::from_bytes(&[3; 32]));
    let url = spawn_server(Arc::clone(&log)).await?;
    let transport = HttpTransport::with_timeout(&url, Duration::from_secs(5))?;
    let client = LogClient::with_defaults(LOG, transport, public_key).with_options(ClientOptions {
        poll_interval: Duration::from_millis(10),
    });
    Ok((log, client))
}

#[tokio::test]
async fn test_verified_reads_over_http() -> Result<()> {
    let (log, client) = setup().await?;
    let ctx = Context::with_timeout(Duration::from_secs(10));

    assert_eq!(client.update_root(&ctx).await?.tree_size(), 0);
    for value in ["A", "B", "C", "D"] {
        client.add_leaf(&ctx, value.as_bytes()).await?;
    }
    assert_eq!(log.pending_count(LOG)?, 4);
    log.sequence(LOG)?;

    assert_eq!(client.update_root(&ctx).await?.tree_size(), 4);
    assert_eq!(client.get_by_index(&ctx, 2).await?.leaf_value, b"C");
    assert_eq!(client.list_by_index(&ctx, 1, 3).await?.len(), 3);
    assert_eq!(
        client
            .verify_inclusion_by_hash(&ctx, &Rfc6962Hasher.leaf_hash(b"D"))
            .await?,
        3
    );

    client.add_leaf(&ctx, b"E").await?;
    log.sequence(LOG)?;
    let entry = client.add_leaf_and_wait(&ctx, b"E").await?;
    assert_eq!(entry.index, 4);
    assert_eq!(client.root().map(|root| root.tree_size()), Some(5));
    Ok(())
}

#[tokio::test]
async fn test_misbehaving_server_over_http() -> Result<()> {
    let (log, client) = setup().await?;
    let ctx = Context::background();
    for value in ["A", "B", "C"] {
        client.add_leaf(&ctx, value.as_bytes()).await?;
    }
    log.sequence(LOG)?;
    let trusted = client.update_root(&ctx).await?;

    log.truncate(LOG, 2)?;
    assert!(matches!(
        client.update_root(&ctx).await,
        Err(Error::InvalidConsistencyProof(_))
    ));
    // the leaf is gone on the server
    assert!(matches!(
        client.get_by_index(&ctx, 2).await,
        Err(Error::NotFound { index: 2, tree_size: 3 })
    ));
    assert_eq!(client.root(), Some(trusted));
    Ok(())
}

#[tokio::test]
async fn test_error_envelopes_map_to_transport_errors() -> Result<()> {
    let (_log, client) = setup().await?;
    let transport = client.transport();

    assert!(matches!(
        transport.get_latest_signed_root("missing").await,
        Err(TransportError::NotFound(_))
    ));
    assert!(matches!(
        transport.get_consistency_proof(LOG, 2, 1).await,
        Err(TransportError::InvalidRequest(_))
    ));
    assert!(matches!(
        transport.get_leaf_by_index(LOG, 0, 1).await,
        Err(TransportError::NotFound(_))
    ));

    // no envelope at all
    let wrong_path = HttpTransport::new(&format!("{}/nowhere", transport.api_base_url()))?;
    assert!(matches!(
        wrong_path.get_latest_signed_root(LOG).await,
        Err(TransportError::Server(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let transport = HttpTransport::with_timeout(&format!("http://{addr}"), Duration::from_secs(2))?;
    let client = LogClient::with_defaults(LOG, transport, vec![0; 32]);
    let err = client
        .update_root(&Context::background())
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, Error::Transport(TransportError::Request(_))));
    assert!(!err.is_verification_failure());
    Ok(())
}
