//! HTTP access to a remote log service.
//!
//! Every endpoint lives under `/logs/{log_name}/` and answers with an
//! [`ApiResponse`] envelope; byte fields travel as base64 strings.
//!
//! | method | path | query / body |
//! |---|---|---|
//! | POST | `leaves` | [`QueueLeafRequest`] |
//! | GET | `leaves/{index}` | [`LeafQuery`] |
//! | GET | `leaves` | [`RangeQuery`] |
//! | GET | `root` | |
//! | GET | `consistency` | [`ConsistencyQuery`] |
//! | GET | `proof` | [`InclusionQuery`] |

pub mod client;
pub mod responses;

pub use client::HttpTransport;
pub use responses::{
    ApiResponse, ConsistencyProofResponse, ConsistencyQuery, InclusionProofResponse, InclusionQuery,
    LeafQuery, LeafResponse, LeavesResponse, QueueLeafRequest, QueueLeafResponse, RangeQuery,
    SignedRootResponse,
};
