use serde::{Deserialize, Serialize};

use crate::encoding::{base64_bytes, base64_path};
use crate::transport::TransportError;
use crate::types::{IndexedProof, LeafProof, SignedLogRoot};

/// `error_type` sent when the log, leaf or tree size does not exist
pub const NOT_FOUND: &str = "not_found";
/// `error_type` sent when the request parameters are invalid
pub const INVALID_REQUEST: &str = "invalid_request";

/// Unified API response wrapper
///
/// All endpoints return either Success(data) or `Error(error_info)`
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    /// Successful response with data
    #[serde(rename = "ok")]
    Success(T),
    /// Error response with message and optional error type
    Error {
        /// Human-readable error message
        error: String,
        /// Machine-readable error type for client handling
        #[serde(skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
    },
}

impl<T> ApiResponse<T> {
    /// Creates a successful response
    pub const fn success(data: T) -> Self {
        Self::Success(data)
    }

    /// Creates an error response with just a message
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            error_type: None,
        }
    }

    /// Creates an error response with both message and error type
    pub fn error_with_type(error: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            error_type: Some(error_type.into()),
        }
    }

    /// Unwraps the envelope, turning an error body back into the transport error it encodes
    ///
    /// # Errors
    ///
    /// Returns the error carried by an `Error` response.
    pub fn into_result(self) -> Result<T, TransportError> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Error { error, error_type } => Err(match error_type.as_deref() {
                Some(NOT_FOUND) => TransportError::NotFound(error),
                Some(INVALID_REQUEST) => TransportError::InvalidRequest(error),
                _ => TransportError::Server(error),
            }),
        }
    }
}

impl<T> From<Result<T, TransportError>> for ApiResponse<T> {
    fn from(result: Result<T, TransportError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(TransportError::NotFound(msg)) => Self::error_with_type(msg, NOT_FOUND),
            Err(TransportError::InvalidRequest(msg)) => Self::error_with_type(msg, INVALID_REQUEST),
            Err(err) => Self::error(err.to_string()),
        }
    }
}

/// Body of POST `/logs/{log_name}/leaves`
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueLeafRequest {
    /// Base64-encoded leaf bytes
    #[serde(with = "base64_bytes")]
    pub leaf_value: Vec<u8>,
}

/// Response for POST `/logs/{log_name}/leaves`
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueLeafResponse {
    /// Name of the log
    pub log_name: String,
}

/// Query for GET `/logs/{log_name}/leaves/{index}`
#[derive(Debug, Serialize, Deserialize)]
pub struct LeafQuery {
    /// Size of the tree the audit path is computed against
    pub tree_size: u64,
}

/// Response for GET `/logs/{log_name}/leaves/{index}`
#[derive(Debug, Serialize, Deserialize)]
pub struct LeafResponse {
    /// Name of the log
    pub log_name: String,
    /// The leaf and its audit path
    pub leaf: LeafProof,
}

/// Query for GET `/logs/{log_name}/leaves`
#[derive(Debug, Serialize, Deserialize)]
pub struct RangeQuery {
    pub start: u64,
    pub count: u64,
    pub tree_size: u64,
}

/// Response for GET `/logs/{log_name}/leaves`
#[derive(Debug, Serialize, Deserialize)]
pub struct LeavesResponse {
    /// Name of the log
    pub log_name: String,
    /// The leaves in index order, each with its audit path
    pub leaves: Vec<LeafProof>,
}

/// Response for GET `/logs/{log_name}/root`
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedRootResponse {
    /// Name of the log
    pub log_name: String,
    /// The latest signed tree head
    pub root: SignedLogRoot,
}

/// Query for GET `/logs/{log_name}/consistency`
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsistencyQuery {
    /// Size of the older tree
    pub first: u64,
    /// Size of the newer tree
    pub second: u64,
}

/// Response for GET `/logs/{log_name}/consistency`
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsistencyProofResponse {
    /// Name of the log
    pub log_name: String,
    /// Base64-encoded proof hashes
    #[serde(with = "base64_path")]
    pub proof: Vec<Vec<u8>>,
}

/// Query for GET `/logs/{log_name}/proof` (inclusion proof by leaf hash)
#[derive(Debug, Serialize, Deserialize)]
pub struct InclusionQuery {
    /// Base64-encoded leaf hash
    #[serde(with = "base64_bytes")]
    pub hash: Vec<u8>,
    /// Size of the tree the audit path is computed against
    pub tree_size: u64,
}

/// Response for GET `/logs/{log_name}/proof`
#[derive(Debug, Serialize, Deserialize)]
pub struct InclusionProofResponse {
    /// Name of the log
    pub log_name: String,
    /// Index of the leaf and its audit path
    pub proof: IndexedProof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let ok = serde_json::to_value(ApiResponse::success(QueueLeafResponse {
            log_name: "audit".into(),
        }))
        .expect("serializable");
        assert_eq!(ok, serde_json::json!({"status": "ok", "log_name": "audit"}));

        let err = serde_json::to_value(ApiResponse::<QueueLeafResponse>::error("boom"))
            .expect("serializable");
        assert_eq!(err, serde_json::json!({"status": "error", "error": "boom"}));
    }

    #[test]
    fn test_error_types_round_trip_through_envelope() {
        for error in [
            TransportError::NotFound("leaf 9".into()),
            TransportError::InvalidRequest("bad range".into()),
        ] {
            let response = ApiResponse::<()>::from(Err(error.clone()));
            assert_eq!(response.into_result(), Err(error));
        }

        let response = ApiResponse::<()>::from(Err(TransportError::Server("disk".into())));
        assert!(matches!(response.into_result(), Err(TransportError::Server(_))));
    }

    #[test]
    fn test_root_response_uses_base64() {
        let body = r#"{"status":"ok","log_name":"audit","root":{"tree_size":1,"root_hash":"AAE=","timestamp_nanos":5,"signature":""}}"#;
        let response: ApiResponse<SignedRootResponse> = serde_json::from_str(body).expect("valid body");
        let root = response.into_result().expect("ok envelope").root;
        assert_eq!(root.tree_size, 1);
        assert_eq!(root.root_hash, vec![0, 1]);
        assert!(root.signature.is_empty());
    }
}
