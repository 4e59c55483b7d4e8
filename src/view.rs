//! Membership view and the `Uninitialized`/`Active` state machine.

use serde::{Deserialize, Serialize};

/// Cluster membership, replicated by gossip and installed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct View {
    pub nodes: Vec<String>,
    pub shard_count: usize,
    /// Milliseconds since epoch; the reconfiguration version. Strictly
    /// monotone comparisons drive convergence (V1).
    pub timestamp: u64,
}

impl View {
    pub fn empty() -> Self {
        View {
            nodes: Vec::new(),
            shard_count: 0,
            timestamp: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Groups `nodes[i]` by `i mod shard_count`, in shard order. Returns an
    /// empty list if `shard_count == 0`.
    pub fn shard_groups(&self) -> Vec<(usize, Vec<String>)> {
        if self.shard_count == 0 {
            return Vec::new();
        }
        let mut groups: Vec<Vec<String>> = vec![Vec::new(); self.shard_count];
        for (i, node) in self.nodes.iter().enumerate() {
            groups[i % self.shard_count].push(node.clone());
        }
        groups.into_iter().enumerate().collect()
    }

    pub fn members_of(&self, shard: usize) -> Vec<String> {
        if self.shard_count == 0 {
            return Vec::new();
        }
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| i % self.shard_count == shard)
            .map(|(_, node)| node.clone())
            .collect()
    }

    pub fn self_shard(&self, self_addr: &str) -> Option<usize> {
        if self.shard_count == 0 {
            return None;
        }
        self.nodes
            .iter()
            .position(|n| n == self_addr)
            .map(|idx| idx % self.shard_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Uninitialized,
    Active,
}

/// Per-node membership authority: holds the current `View`, whether this
/// node currently belongs to it, and the derived shard id.
#[derive(Debug, Clone)]
pub struct ViewManager {
    view: View,
    mode: ViewMode,
    self_addr: String,
    self_shard: Option<usize>,
}

/// Outcome of installing a candidate view, used by the caller to decide
/// whether to (re)start or stop the gossip ticker and whether a hand-off
/// pass over the store is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTransition {
    /// Candidate was stale (timestamp not newer) and was ignored.
    Rejected,
    /// Accepted; node is (now, still) in the view.
    AcceptedActive,
    /// Accepted; node is not (or no longer) in the view.
    AcceptedInactive,
}

impl ViewManager {
    pub fn new(self_addr: String) -> Self {
        ViewManager {
            view: View::empty(),
            mode: ViewMode::Uninitialized,
            self_addr,
            self_shard: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        matches!(self.mode, ViewMode::Active)
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn self_shard(&self) -> Option<usize> {
        self.self_shard
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Installs `candidate` if it is not stale. A zero `timestamp` on the
    /// candidate is treated as "unversioned" and always accepted, matching
    /// the admin PUT contract where the orchestrator may omit `time`.
    pub fn set_view(&mut self, candidate: View) -> (ViewTransition, Vec<String>) {
        if candidate.timestamp != 0 && candidate.timestamp < self.view.timestamp {
            return (ViewTransition::Rejected, Vec::new());
        }

        let departed: Vec<String> = self
            .view
            .nodes
            .iter()
            .filter(|n| !candidate.nodes.contains(n))
            .cloned()
            .collect();

        let in_view = candidate.nodes.iter().any(|n| n == &self.self_addr);
        self.self_shard = if in_view {
            candidate.self_shard(&self.self_addr)
        } else {
            None
        };
        self.view = candidate;
        self.mode = if in_view {
            ViewMode::Active
        } else {
            ViewMode::Uninitialized
        };

        let transition = if in_view {
            ViewTransition::AcceptedActive
        } else {
            ViewTransition::AcceptedInactive
        };
        (transition, departed)
    }

    /// Admin DELETE: decommission this node entirely.
    pub fn clear_view(&mut self) {
        self.view = View::empty();
        self.mode = ViewMode::Uninitialized;
        self.self_shard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(nodes: &[&str], shards: usize, ts: u64) -> View {
        View {
            nodes: nodes.iter().map(|s| s.to_string()).collect(),
            shard_count: shards,
            timestamp: ts,
        }
    }

    #[test]
    fn uninitialized_until_first_view_including_self() {
        let mut vm = ViewManager::new("a".into());
        assert_eq!(vm.mode(), ViewMode::Uninitialized);

        let (t, _) = vm.set_view(view(&["a", "b"], 1, 10));
        assert_eq!(t, ViewTransition::AcceptedActive);
        assert_eq!(vm.mode(), ViewMode::Active);
        assert_eq!(vm.self_shard(), Some(0));
    }

    #[test]
    fn excluding_self_returns_to_uninitialized() {
        let mut vm = ViewManager::new("c".into());
        vm.set_view(view(&["a", "b", "c"], 1, 10));
        assert!(vm.is_active());

        let (t, _) = vm.set_view(view(&["a", "b"], 1, 20));
        assert_eq!(t, ViewTransition::AcceptedInactive);
        assert!(!vm.is_active());
        assert_eq!(vm.self_shard(), None);
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let mut vm = ViewManager::new("a".into());
        vm.set_view(view(&["a"], 1, 100));
        let (t, _) = vm.set_view(view(&["a", "b"], 1, 50));
        assert_eq!(t, ViewTransition::Rejected);
        assert_eq!(vm.view().nodes, vec!["a".to_string()]);
    }

    #[test]
    fn departed_nodes_are_reported() {
        let mut vm = ViewManager::new("a".into());
        vm.set_view(view(&["a", "b", "c"], 1, 1));
        let (_, departed) = vm.set_view(view(&["a", "b"], 1, 2));
        assert_eq!(departed, vec!["c".to_string()]);
    }

    #[test]
    fn clear_view_resets_everything() {
        let mut vm = ViewManager::new("a".into());
        vm.set_view(view(&["a"], 1, 1));
        vm.clear_view();
        assert_eq!(vm.mode(), ViewMode::Uninitialized);
        assert!(vm.view().is_empty());
    }

    #[test]
    fn shard_groups_bucket_nodes_round_robin() {
        let v = view(&["a", "b", "c", "d"], 2, 1);
        let groups = v.shard_groups();
        assert_eq!(groups[0].1, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(groups[1].1, vec!["b".to_string(), "d".to_string()]);
    }
}
