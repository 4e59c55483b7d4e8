//! View/resharding state machine tests (§4.3, §8), including the hand-off
//! decision recorded in DESIGN.md ("hand-off on resharding").

use causal_kvs::placement::shard_for_key;
use causal_kvs::store::Store;
use causal_kvs::view::{View, ViewManager, ViewMode, ViewTransition};
use causal_kvs::VectorClock;

#[test]
fn placement_is_deterministic_across_repeated_calls_and_views() {
    let view_a = View {
        nodes: vec!["a".into(), "b".into(), "c".into()],
        shard_count: 3,
        timestamp: 1,
    };
    for key in ["foo", "bar", "baz", "a-very-long-key-name-for-good-measure"] {
        let first = shard_for_key(key, view_a.nodes.len(), view_a.shard_count);
        let second = shard_for_key(key, view_a.nodes.len(), view_a.shard_count);
        assert_eq!(first, second);
        assert!(first.unwrap() < view_a.shard_count);
    }
}

#[test]
fn retained_keys_satisfy_placement_under_new_view() {
    let mut store = Store::new();
    for i in 0..50 {
        store
            .local_put(&format!("key-{i}"), "v".into(), VectorClock::new())
            .unwrap();
    }

    let new_view = View {
        nodes: vec!["a".into(), "b".into(), "c".into()],
        shard_count: 3,
        timestamp: 2,
    };
    store.reshape(&new_view, Some(1));

    for key in store.snapshot() {
        let shard = shard_for_key(&key.key, new_view.nodes.len(), new_view.shard_count).unwrap();
        assert_eq!(shard, 1);
    }
}

#[test]
fn uninitialized_to_active_on_first_view_including_self() {
    let mut vm = ViewManager::new("b".into());
    assert_eq!(vm.mode(), ViewMode::Uninitialized);

    let candidate = View {
        nodes: vec!["a".into(), "b".into()],
        shard_count: 1,
        timestamp: 10,
    };
    let (transition, departed) = vm.set_view(candidate);
    assert_eq!(transition, ViewTransition::AcceptedActive);
    assert!(departed.is_empty());
    assert!(vm.is_active());
    assert_eq!(vm.self_shard(), Some(0));
}

#[test]
fn departure_from_view_quiesces_to_uninitialized() {
    let mut vm = ViewManager::new("c".into());
    vm.set_view(View {
        nodes: vec!["a".into(), "b".into(), "c".into()],
        shard_count: 1,
        timestamp: 1,
    });
    assert!(vm.is_active());

    let (transition, _) = vm.set_view(View {
        nodes: vec!["a".into(), "b".into()],
        shard_count: 1,
        timestamp: 2,
    });
    assert_eq!(transition, ViewTransition::AcceptedInactive);
    assert!(!vm.is_active());
    assert_eq!(vm.self_shard(), None);
}

#[test]
fn stale_view_is_rejected_but_get_view_would_still_report_the_newer_one() {
    let mut vm = ViewManager::new("a".into());
    vm.set_view(View {
        nodes: vec!["a".into()],
        shard_count: 1,
        timestamp: 100,
    });

    let (transition, _) = vm.set_view(View {
        nodes: vec!["a".into(), "b".into()],
        shard_count: 1,
        timestamp: 50,
    });
    assert_eq!(transition, ViewTransition::Rejected);
    assert_eq!(vm.view().nodes, vec!["a".to_string()]);
}
