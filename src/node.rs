//! The `Node`: one value per process, owning the store, the view, and the
//! shared outbound HTTP client. Everything else (coordinator, gossip, HTTP
//! handlers) borrows it through an `Arc`.

use crate::store::Store;
use crate::view::{ViewManager, ViewMode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Everything guarded by the single exclusive lock of §5: the view, the
/// derived shard id (inside `ViewManager`), and the record map.
pub struct NodeState {
    pub view: ViewManager,
    pub store: Store,
}

pub struct Node {
    pub state: Mutex<NodeState>,
    pub self_addr: String,
    pub http: reqwest::Client,
    gossip_task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    pub fn new(self_addr: String) -> Arc<Node> {
        let http = reqwest::Client::builder()
            .build()
            .expect("reqwest client construction cannot fail with default settings");

        Arc::new(Node {
            state: Mutex::new(NodeState {
                view: ViewManager::new(self_addr.clone()),
                store: Store::new(),
            }),
            self_addr,
            http,
            gossip_task: Mutex::new(None),
        })
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().view.mode() == ViewMode::Active
    }

    /// Starts the gossip ticker if one is not already running. Safe to call
    /// every time the node transitions into `Active`; idempotent because a
    /// handle is only ever replaced, never doubled up.
    pub fn ensure_gossip_running(self: &Arc<Self>, tick: Duration) {
        let mut slot = self.gossip_task.lock();
        if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }
        let node = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            crate::gossip::run_ticker(node, tick).await;
        }));
    }

    /// Aborts the gossip ticker. Called from the admin DELETE path and when
    /// a view change excludes this node.
    pub fn stop_gossip(&self) {
        if let Some(handle) = self.gossip_task.lock().take() {
            handle.abort();
        }
    }
}
