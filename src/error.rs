//! Client-facing error taxonomy (§7) and its HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node is not part of any view")]
    Uninitialized,

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("key not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("upstream shard {shard} unreachable")]
    UpstreamDown { shard: usize, members: Vec<String> },

    /// Not surfaced verbatim to a client; logged and collapsed into a
    /// generic 500 only if it somehow escapes the gossip/forward paths
    /// that are supposed to swallow it.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            NodeError::Uninitialized => (
                StatusCode::from_u16(418).unwrap(),
                json!({ "error": "uninitialized" }),
            ),
            NodeError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            NodeError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "not found" })),
            NodeError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "method not allowed" }),
            ),
            NodeError::UpstreamDown { shard, members } => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "upstream down",
                    "upstream": { "shard_id": shard, "nodes": members },
                }),
            ),
            NodeError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error surfaced to client");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
