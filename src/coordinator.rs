//! Request Coordinator: validates, places, and either executes locally or
//! forwards a data request to the owning shard (§4.5).

use crate::clock::VectorClock;
use crate::error::NodeError;
use crate::node::Node;
use crate::placement;
use crate::record::{key_len_ok, value_len_ok};
use crate::store::GetOutcome;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Budget for a cross-shard forward race (§4.5, §5).
const FORWARD_TIMEOUT: Duration = Duration::from_secs(20);

/// Resolves which shard owns `key` under the node's current view, and
/// whether that's this node. Returns the members of the owning shard so the
/// caller can forward without re-locking.
fn route(node: &Node, key: &str) -> Result<RouteDecision, NodeError> {
    let state = node.state.lock();
    if !state.view.is_active() {
        return Err(NodeError::Uninitialized);
    }
    let view = state.view.view();
    let target_shard = placement::shard_for_key(key, view.nodes.len(), view.shard_count)
        .map_err(|_| NodeError::BadRequest("shard_count must be nonzero"))?;

    let self_shard = state.view.self_shard();
    if Some(target_shard) == self_shard {
        Ok(RouteDecision::Local)
    } else {
        Ok(RouteDecision::Remote {
            shard: target_shard,
            members: view.members_of(target_shard),
        })
    }
}

enum RouteDecision {
    Local,
    Remote { shard: usize, members: Vec<String> },
}

pub struct PutOutcome {
    pub clock: VectorClock,
    pub created: bool,
}

pub async fn get(node: &Arc<Node>, key: &str) -> Result<(String, VectorClock), NodeError> {
    if !key_len_ok(key) {
        return Err(NodeError::BadRequest("key must be non-empty and <= 2048 bytes"));
    }

    match route(node, key)? {
        RouteDecision::Local => {
            let state = node.state.lock();
            match state.store.local_get(key) {
                GetOutcome::Found { value, clock } => Ok((value, clock)),
                GetOutcome::NotFound => Err(NodeError::NotFound),
            }
        }
        RouteDecision::Remote { shard, members } => {
            let (status, body) = forward(node, Method::GET, key, None, members, shard).await?;
            translate_forwarded(status, body, |body| {
                let value = body
                    .get("val")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let clock = parse_clock(&body);
                (value, clock)
            })
        }
    }
}

pub async fn put(
    node: &Arc<Node>,
    key: &str,
    value: String,
    client_clock: VectorClock,
) -> Result<PutOutcome, NodeError> {
    if !key_len_ok(key) {
        return Err(NodeError::BadRequest("key must be non-empty and <= 2048 bytes"));
    }
    if !value_len_ok(&value) {
        return Err(NodeError::BadRequest("value must be <= 8000000 bytes"));
    }

    match route(node, key)? {
        RouteDecision::Local => {
            let mut state = node.state.lock();
            let (clock, created) = state
                .store
                .local_put(key, value, client_clock)
                .map_err(|_| NodeError::BadRequest("key/value too large"))?;
            Ok(PutOutcome { clock, created })
        }
        RouteDecision::Remote { shard, members } => {
            let body = json!({
                "val": value,
                "causal-metadata": clock_to_json(&client_clock),
            });
            let (status, body) = forward(node, Method::PUT, key, Some(body), members, shard).await?;
            translate_forwarded(status, body, |body| PutOutcome {
                clock: parse_clock(&body),
                created: status_is_created(status),
            })
        }
    }
}

pub async fn delete(
    node: &Arc<Node>,
    key: &str,
    client_clock: VectorClock,
) -> Result<VectorClock, NodeError> {
    if !key_len_ok(key) {
        return Err(NodeError::BadRequest("key must be non-empty and <= 2048 bytes"));
    }

    match route(node, key)? {
        RouteDecision::Local => {
            let mut state = node.state.lock();
            state
                .store
                .local_delete(key, client_clock)
                .map_err(|_| NodeError::NotFound)
        }
        RouteDecision::Remote { shard, members } => {
            let body = json!({ "causal-metadata": clock_to_json(&client_clock) });
            let (status, body) = forward(node, Method::DELETE, key, Some(body), members, shard).await?;
            translate_forwarded(status, body, |body| parse_clock(&body))
        }
    }
}

/// `GET /kvs/data`: local-only enumeration, never forwarded (§4.5).
pub fn list(node: &Node) -> Result<(usize, Vec<String>, VectorClock), NodeError> {
    let state = node.state.lock();
    if !state.view.is_active() {
        return Err(NodeError::Uninitialized);
    }
    let snapshot = state.store.snapshot();
    let mut combined = VectorClock::new();
    let mut live_keys = Vec::new();
    for record in &snapshot {
        combined.merge(&record.clock);
        if !record.is_tombstone() {
            live_keys.push(record.key.clone());
        }
    }
    let shard_id = state.view.self_shard().unwrap_or(0);
    Ok((shard_id, live_keys, combined))
}

fn status_is_created(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 201
}

/// A forwarded response is only meaningful if the remote returned success;
/// a remote 4xx/5xx is relayed back to our own caller verbatim by mapping
/// it onto the taxonomy we already have (the remote already validated on
/// our behalf, so its status code is authoritative).
fn translate_forwarded<T>(
    status: reqwest::StatusCode,
    body: Value,
    on_success: impl FnOnce(Value) -> T,
) -> Result<T, NodeError> {
    match status.as_u16() {
        200 | 201 => Ok(on_success(body)),
        404 => Err(NodeError::NotFound),
        400 => Err(NodeError::BadRequest("rejected by owning shard")),
        418 => Err(NodeError::Uninitialized),
        _ => Err(NodeError::Internal(format!(
            "unexpected status {status} from owning shard"
        ))),
    }
}

fn parse_clock(body: &Value) -> VectorClock {
    body.get("causal-metadata")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn clock_to_json(clock: &VectorClock) -> Value {
    serde_json::to_value(clock).unwrap_or(Value::Null)
}

/// Fans a request out in parallel to every member of the owning shard and
/// returns the first *successful* (2xx) response received (§4.5:
/// "winner-take-all"). A lagging replica can legitimately answer a GET
/// with 404 before a caught-up replica answers 200, so an error response
/// is held as a fallback rather than returned immediately: the call keeps
/// waiting on the remaining members until either a 2xx arrives, every
/// member has answered, or the 20 s budget elapses, in which case the
/// most recent fallback error is returned (or `UpstreamDown` if nothing
/// came back at all). Each member gets the full 20 s budget independently;
/// the coordinator's own deadline is the same 20 s, not a sum over
/// members, since the race is against the first responder.
async fn forward(
    node: &Node,
    method: Method,
    key: &str,
    body: Option<Value>,
    members: Vec<String>,
    shard: usize,
) -> Result<(reqwest::StatusCode, Value), NodeError> {
    if members.is_empty() {
        return Err(NodeError::UpstreamDown { shard, members });
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(members.len());

    for member in &members {
        let client = node.http.clone();
        let method = method.clone();
        let url = format!("http://{member}/kvs/data/{key}");
        let body = body.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let mut request = client.request(method, &url).timeout(FORWARD_TIMEOUT);
            if let Some(b) = &body {
                request = request.json(b);
            }
            if let Ok(response) = request.send().await {
                let status = response.status();
                if let Ok(json) = response.json::<Value>().await {
                    let _ = tx.send((status, json)).await;
                }
            }
        });
    }
    drop(tx);

    let deadline = tokio::time::Instant::now() + FORWARD_TIMEOUT;
    let mut fallback: Option<(reqwest::StatusCode, Value)> = None;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some((status, body))) if status.is_success() => return Ok((status, body)),
            Ok(Some(result)) => fallback = Some(result),
            Ok(None) => break,
            Err(_) => break,
        }
    }

    fallback.ok_or(NodeError::UpstreamDown { shard, members })
}
