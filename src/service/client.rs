use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{Config, DEFAULT_REQUEST_TIMEOUT};
use crate::service::responses::{
    ApiResponse, ConsistencyProofResponse, ConsistencyQuery, InclusionProofResponse, InclusionQuery,
    LeafQuery, LeafResponse, LeavesResponse, QueueLeafRequest, QueueLeafResponse, RangeQuery,
    SignedRootResponse,
};
use crate::transport::{LogTransport, TransportError};
use crate::types::{IndexedProof, LeafProof, SignedLogRoot};

/// [`LogTransport`] over the log service's JSON HTTP API
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client for making requests to the API
    http_client: HttpClient,
    /// Base URL of the log service API
    api_base_url: String,
}

impl HttpTransport {
    /// Creates a transport with the default request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the `HTTPClient` build fails.
    pub fn new(api_base_url: &str) -> Result<Self, TransportError> {
        Self::with_timeout(api_base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a transport whose requests give up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the `HTTPClient` build fails.
    pub fn with_timeout(api_base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(request_error)?;

        Ok(Self {
            http_client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a transport from the server URL and timeout in `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the `HTTPClient` build fails.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::with_timeout(&config.server_url, config.request_timeout)
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    fn url(&self, log_name: &str, path: &str) -> String {
        format!("{}/logs/{}/{}", self.api_base_url, log_name, path)
    }

    /// Sends a request and unwraps the response envelope
    async fn call<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, TransportError> {
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(request_error)?;
        debug!(%status, bytes = body.len(), "log service responded");
        match serde_json::from_slice::<ApiResponse<R>>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(err) if status.is_success() => Err(TransportError::Request(format!(
                "unreadable response body: {err}"
            ))),
            Err(_) => Err(TransportError::Server(format!("HTTP {status}"))),
        }
    }
}

#[async_trait]
impl LogTransport for HttpTransport {
    async fn queue_leaf(&self, log_id: &str, leaf_value: &[u8]) -> Result<(), TransportError> {
        let body = QueueLeafRequest {
            leaf_value: leaf_value.to_vec(),
        };
        let request = self.http_client.post(self.url(log_id, "leaves")).json(&body);
        self.call::<QueueLeafResponse>(request).await.map(|_| ())
    }

    async fn get_leaf_by_index(
        &self,
        log_id: &str,
        index: u64,
        tree_size: u64,
    ) -> Result<LeafProof, TransportError> {
        let request = self
            .http_client
            .get(self.url(log_id, &format!("leaves/{index}")))
            .query(&LeafQuery { tree_size });
        self.call::<LeafResponse>(request).await.map(|data| data.leaf)
    }

    async fn get_leaves_in_range(
        &self,
        log_id: &str,
        start: u64,
        count: u64,
        tree_size: u64,
    ) -> Result<Vec<LeafProof>, TransportError> {
        let request = self
            .http_client
            .get(self.url(log_id, "leaves"))
            .query(&RangeQuery {
                start,
                count,
                tree_size,
            });
        self.call::<LeavesResponse>(request).await.map(|data| data.leaves)
    }

    async fn get_latest_signed_root(&self, log_id: &str) -> Result<SignedLogRoot, TransportError> {
        let request = self.http_client.get(self.url(log_id, "root"));
        self.call::<SignedRootResponse>(request).await.map(|data| data.root)
    }

    async fn get_consistency_proof(
        &self,
        log_id: &str,
        size1: u64,
        size2: u64,
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        let request = self
            .http_client
            .get(self.url(log_id, "consistency"))
            .query(&ConsistencyQuery {
                first: size1,
                second: size2,
            });
        self.call::<ConsistencyProofResponse>(request)
            .await
            .map(|data| data.proof)
    }

    async fn get_inclusion_proof_by_hash(
        &self,
        log_id: &str,
        leaf_hash: &[u8],
        tree_size: u64,
    ) -> Result<IndexedProof, TransportError> {
        let request = self
            .http_client
            .get(self.url(log_id, "proof"))
            .query(&InclusionQuery {
                hash: leaf_hash.to_vec(),
                tree_size,
            });
        self.call::<InclusionProofResponse>(request)
            .await
            .map(|data| data.proof)
    }
}

fn request_error(err: reqwest::Error) -> TransportError {
    TransportError::Request(err.to_string())
}
