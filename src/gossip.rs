//! Gossip Engine: periodic anti-entropy fan-out, and the receiver-side logic
//! for inbound view/state gossip and view installation in general (§4.3,
//! §4.4). Installing a view is shared by the admin PUT and the gossip PUT
//! receiver, since both ultimately call `ViewManager::set_view`.

use crate::node::Node;
use crate::record::Record;
use crate::view::{View, ViewTransition};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gossip tick period (§4.4) and per-peer gossip timeout (§5).
pub const GOSSIP_INTERVAL: Duration = Duration::from_secs(1);
const GOSSIP_PEER_TIMEOUT: Duration = Duration::from_secs(1);

/// Installs `candidate` as the node's view (admin PUT, or inbound
/// `/gossip/view`). Performs the associated side effects: starting or
/// stopping the gossip ticker, handing evicted records off to their new
/// owning shard, and best-effort-notifying departed peers.
pub async fn install_view(node: &Arc<Node>, candidate: View) -> ViewTransition {
    let (transition, departed, evicted, new_view) = {
        let mut state = node.state.lock();
        let (transition, departed) = state.view.set_view(candidate);
        let new_view = state.view.view().clone();
        let evicted = if transition == ViewTransition::Rejected {
            Vec::new()
        } else {
            state.store.reshape(&new_view, state.view.self_shard())
        };
        (transition, departed, evicted, new_view)
    };

    match transition {
        ViewTransition::Rejected => {
            debug!("ignored stale view candidate");
        }
        ViewTransition::AcceptedActive => {
            info!(nodes = ?new_view.nodes, shards = new_view.shard_count, "view active");
            node.ensure_gossip_running(GOSSIP_INTERVAL);
        }
        ViewTransition::AcceptedInactive => {
            info!("view excludes this node, becoming uninitialized");
            node.stop_gossip();
        }
    }

    if !evicted.is_empty() {
        hand_off(node, evicted, &new_view).await;
    }
    if !departed.is_empty() {
        notify_departed(node, departed).await;
    }

    transition
}

/// Admin DELETE `/kvs/admin/view`: full decommission.
pub fn clear_view(node: &Node) {
    let mut state = node.state.lock();
    state.view.clear_view();
    state.store = crate::store::Store::new();
    drop(state);
    node.stop_gossip();
}

/// Receiver side of `/gossip`: merges an inbound snapshot into the local
/// store under the node lock.
pub fn apply_incoming_state(node: &Node, records: Vec<Record>) {
    node.state.lock().store.merge(records);
}

/// Runs the 1 s gossip tick until the task is aborted (on `clear_view` or on
/// a view change that excludes this node).
pub async fn run_ticker(node: Arc<Node>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        if !node.is_active() {
            return;
        }
        gossip_view_round(&node).await;
        gossip_state_round(&node).await;
    }
}

async fn gossip_view_round(node: &Arc<Node>) {
    let (peers, view) = {
        let state = node.state.lock();
        let view = state.view.view().clone();
        let peers: Vec<String> = view
            .nodes
            .iter()
            .filter(|n| *n != &node.self_addr)
            .cloned()
            .collect();
        (peers, view)
    };

    for peer in peers {
        let client = node.http.clone();
        let view = view.clone();
        tokio::spawn(async move {
            let url = format!("http://{peer}/gossip/view");
            let result = client
                .put(&url)
                .timeout(GOSSIP_PEER_TIMEOUT)
                .json(&view)
                .send()
                .await;
            if let Err(err) = result {
                debug!(%peer, error = %err, "view gossip to peer failed (swallowed)");
            }
        });
    }
}

async fn gossip_state_round(node: &Arc<Node>) {
    let (shard_peers, snapshot) = {
        let state = node.state.lock();
        let Some(self_shard) = state.view.self_shard() else {
            return;
        };
        let peers: Vec<String> = state
            .view
            .view()
            .members_of(self_shard)
            .into_iter()
            .filter(|n| n != &node.self_addr)
            .collect();
        (peers, state.store.snapshot())
    };

    if shard_peers.is_empty() || snapshot.is_empty() {
        return;
    }

    for peer in shard_peers {
        let client = node.http.clone();
        let snapshot = snapshot.clone();
        tokio::spawn(async move {
            let url = format!("http://{peer}/gossip");
            let result = client
                .put(&url)
                .timeout(GOSSIP_PEER_TIMEOUT)
                .json(&snapshot)
                .send()
                .await;
            if let Err(err) = result {
                debug!(%peer, error = %err, "state gossip to peer failed (swallowed)");
            }
        });
    }
}

/// One-shot targeted state transfer of evicted records to their new owning
/// shard, before they vanish from this node (DESIGN.md: hand-off on
/// resharding). Best effort: any single member of the new shard receiving
/// the delta is enough, since it will gossip onward to its peers.
async fn hand_off(node: &Arc<Node>, evicted: Vec<Record>, new_view: &View) {
    use std::collections::HashMap;

    let mut by_shard: HashMap<usize, Vec<Record>> = HashMap::new();
    for record in evicted {
        let shard = crate::placement::shard_for_key(
            &record.key,
            new_view.nodes.len(),
            new_view.shard_count,
        );
        if let Ok(shard) = shard {
            by_shard.entry(shard).or_default().push(record);
        }
    }

    for (shard, records) in by_shard {
        let Some(target) = new_view.members_of(shard).into_iter().next() else {
            continue;
        };
        let client = node.http.clone();
        tokio::spawn(async move {
            let url = format!("http://{target}/gossip");
            let result = client
                .put(&url)
                .timeout(GOSSIP_PEER_TIMEOUT)
                .json(&records)
                .send()
                .await;
            if let Err(err) = result {
                warn!(%target, error = %err, "reshard hand-off failed (swallowed)");
            }
        });
    }
}

/// Fire-and-forget DELETE to nodes that left the view, so they quiesce to
/// `Uninitialized` (§4.3).
async fn notify_departed(node: &Arc<Node>, departed: Vec<String>) {
    for addr in departed {
        let client = node.http.clone();
        tokio::spawn(async move {
            let url = format!("http://{addr}/kvs/admin/view");
            let result = client.delete(&url).timeout(GOSSIP_PEER_TIMEOUT).send().await;
            if let Err(err) = result {
                debug!(%addr, error = %err, "departed-node notification failed (swallowed)");
            }
        });
    }
}
