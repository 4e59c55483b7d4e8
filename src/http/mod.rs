//! Axum HTTP layer: the external interface of §6. Handlers are thin —
//! decode, call the coordinator/gossip layer, map the result to a response.

mod types;

use crate::clock::VectorClock;
use crate::coordinator;
use crate::error::NodeError;
use crate::gossip;
use crate::node::Node;
use crate::record::Record;
use crate::view::View;
use axum::extract::{Path, State};
use bytes::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use types::*;

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/kvs/data", get(list_keys))
        .route(
            "/kvs/data/:key",
            get(get_key).put(put_key).delete(delete_key),
        )
        .route(
            "/kvs/admin/view",
            get(get_admin_view).put(put_admin_view).delete(delete_admin_view),
        )
        .route("/gossip", put(gossip_state))
        .route("/gossip/view", put(gossip_view))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

async fn health() -> &'static str {
    "ok"
}

async fn get_key(State(node): State<Arc<Node>>, Path(key): Path<String>) -> Response {
    match coordinator::get(&node, &key).await {
        Ok((val, causal_metadata)) => (
            StatusCode::OK,
            Json(GetResponse { val, causal_metadata }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn put_key(
    State(node): State<Arc<Node>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    let parsed: PutBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(_) => return NodeError::BadRequest("malformed request body").into_response(),
    };
    let client_clock = VectorClock::from_option(parsed.causal_metadata);

    match coordinator::put(&node, &key, parsed.val, client_clock).await {
        Ok(outcome) => {
            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(ClockOnlyResponse {
                    causal_metadata: outcome.clock,
                }),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn delete_key(
    State(node): State<Arc<Node>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    let parsed: DeleteBody = serde_json::from_slice(&body).unwrap_or_default();
    let client_clock = VectorClock::from_option(parsed.causal_metadata);

    match coordinator::delete(&node, &key, client_clock).await {
        Ok(causal_metadata) => (StatusCode::OK, Json(ClockOnlyResponse { causal_metadata })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_keys(State(node): State<Arc<Node>>) -> Response {
    match coordinator::list(&node) {
        Ok((shard_id, keys, causal_metadata)) => (
            StatusCode::OK,
            Json(ListResponse {
                shard_id,
                count: keys.len(),
                keys,
                causal_metadata,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_admin_view(State(node): State<Arc<Node>>) -> Response {
    let state = node.state.lock();
    let groups = state.view.view().shard_groups();
    let view = groups
        .into_iter()
        .map(|(shard_id, nodes)| NodeShards { shard_id, nodes })
        .collect();
    (StatusCode::OK, Json(ViewListResponse { view })).into_response()
}

/// Installs a new view (orchestrator contract). Malformed JSON is logged
/// and otherwise ignored — the view is left unchanged (§7).
async fn put_admin_view(State(node): State<Arc<Node>>, body: Bytes) -> Response {
    let parsed: ViewBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(err) => {
            tracing::warn!(error = %err, "admin view PUT had malformed body, view unchanged");
            return StatusCode::OK.into_response();
        }
    };

    let view = match view_from_body(parsed) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(error = %err, "admin view PUT had unparseable time, view unchanged");
            return StatusCode::OK.into_response();
        }
    };

    gossip::install_view(&node, view).await;
    StatusCode::OK.into_response()
}

async fn delete_admin_view(State(node): State<Arc<Node>>) -> Response {
    gossip::clear_view(&node);
    StatusCode::OK.into_response()
}

/// Inbound anti-entropy snapshot from a shard peer.
async fn gossip_state(State(node): State<Arc<Node>>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<Vec<Record>>(&body) {
        Ok(records) => {
            gossip::apply_incoming_state(&node, records);
            StatusCode::OK
        }
        Err(err) => {
            tracing::warn!(error = %err, "gossip state decode failed, ignored");
            StatusCode::OK
        }
    }
}

/// Inbound view gossip from a peer (internal protocol: the serialized
/// `View` struct, not the orchestrator's `ViewBody`).
async fn gossip_view(State(node): State<Arc<Node>>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<View>(&body) {
        Ok(candidate) => {
            gossip::install_view(&node, candidate).await;
            StatusCode::OK
        }
        Err(err) => {
            tracing::warn!(error = %err, "gossip view decode failed, view unchanged");
            StatusCode::OK
        }
    }
}

fn view_from_body(body: ViewBody) -> Result<View, chrono::ParseError> {
    let timestamp = match body.time {
        Some(ref s) => chrono::DateTime::parse_from_rfc3339(s)?.timestamp_millis().max(0) as u64,
        None => 0,
    };
    Ok(View {
        nodes: body.nodes,
        shard_count: body.num_shards,
        timestamp,
    })
}
