//! Property-based invariant tests for snapshots, path resolution and the
//! manager's store mirroring.
//!
//! 1. A control tree's snapshot carries the tree's value.
//! 2. Applying a snapshot to a leaf restores its value.
//! 3. Paths through a missing key or index resolve to `None`.
//! 4. `remove_entries` removes exactly the targeted keys.
//! 5. After `upsert`, the stored snapshot equals the control's snapshot.
//! 6. Derived value streams never repeat a value consecutively.
//! 7. A persisted entry always equals the stripped current snapshot.
//! 8. `deep_merge` is idempotent and lets the source win on leaves.

use formsync::{
    apply_stored_value, deep_merge, remove_entries, resolve, to_snapshot, ArrayControl, Control,
    ControlRef, FieldControl, FormManager, GroupControl, MemoryStorage, StoreState, UpdateOptions,
    UpsertOptions,
};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

// ── Helpers ─────────────────────────────────────────────────────────────

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{1,4}|[0-3]", 0..3).prop_map(|segments| segments.join("."))
}

/// Build a control tree shaped like `value`.
fn build(value: &Value) -> ControlRef {
    match value {
        Value::Object(entries) => {
            let group = GroupControl::new();
            for (name, child) in entries {
                group.add_control(name.clone(), build(child));
            }
            let control: ControlRef = group;
            control
        }
        Value::Array(items) => {
            let array = ArrayControl::new();
            for item in items {
                array.push(build(item));
            }
            let control: ControlRef = array;
            control
        }
        other => FieldControl::new(other.clone()),
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Snapshots carry values
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn snapshot_value_matches_tree(value in value_strategy()) {
        let control = build(&value);
        let snapshot = to_snapshot(control.as_ref());
        prop_assert_eq!(snapshot.value(), &value);
        prop_assert_eq!(snapshot.stripped(), value);
    }

    #[test]
    fn leaf_round_trip(value in value_strategy()) {
        let source = FieldControl::new(value.clone());
        let target = FieldControl::new(Value::Null);
        apply_stored_value(&*target, &to_snapshot(&*source), None, "leaf");
        prop_assert_eq!(target.value(), value);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Missing paths resolve to None
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn missing_key_resolves_to_none(value in value_strategy(), prefix in path_strategy()) {
        let snapshot = to_snapshot(build(&value).as_ref());

        let missing_key = format!("{prefix}.missing_key");
        prop_assert!(resolve(Some(&snapshot), &missing_key).is_none());

        let missing_index = format!("{prefix}[99]");
        prop_assert!(resolve(Some(&snapshot), &missing_index).is_none());

        prop_assert!(resolve(None, &prefix).is_none());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. remove_entries
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn remove_entries_is_exact(
        names in proptest::collection::btree_set("[a-e]", 0..5),
        targets in proptest::collection::btree_set("[a-g]", 0..4),
    ) {
        let state: StoreState = names
            .iter()
            .map(|name| {
                let control = FieldControl::new(Value::from(name.as_str()));
                (name.clone(), to_snapshot(&*control))
            })
            .collect();

        let remaining = remove_entries(&state, &targets);

        let expected: BTreeSet<&String> = names.difference(&targets).collect();
        let actual: BTreeSet<&String> = remaining.keys().collect();
        prop_assert_eq!(actual, expected);
        for (name, snapshot) in &remaining {
            prop_assert_eq!(Some(snapshot), state.get(name));
        }
        prop_assert_eq!(state.len(), names.len());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5-7. Manager mirroring
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn upsert_stores_control_snapshot(value in value_strategy()) {
        let manager = FormManager::default();
        let control = build(&value);
        manager.upsert("form", Arc::clone(&control), UpsertOptions::new());
        prop_assert_eq!(manager.get_control("form", None), Some(to_snapshot(control.as_ref())));
    }

    #[test]
    fn value_stream_never_repeats(edits in proptest::collection::vec(0i64..3, 0..20)) {
        let manager = FormManager::default();
        let field = FieldControl::new(Value::from(0));
        manager.upsert("n", field.clone(), UpsertOptions::new());

        let values = manager.value_changes("n", None).watch();
        for edit in &edits {
            field.set_value(&Value::from(*edit), UpdateOptions::default());
        }

        let seen = values.drain();
        prop_assert!(!seen.is_empty());
        for pair in seen.windows(2) {
            prop_assert_ne!(&pair[0], &pair[1]);
        }
    }

    #[test]
    fn persisted_entry_tracks_snapshot(
        initial in value_strategy(),
        edits in proptest::collection::vec(leaf_strategy(), 1..5),
    ) {
        let manager = FormManager::new(Arc::new(MemoryStorage::new()));
        let field = FieldControl::new(initial);
        manager.upsert("n", field.clone(), UpsertOptions::new().persist(true));

        for edit in &edits {
            field.set_value(edit, UpdateOptions::default());
            let current = manager.get_control("n", None).unwrap();
            prop_assert_eq!(&manager.persisted_state()["n"], &current.stripped());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 8. deep_merge
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn deep_merge_idempotent(value in value_strategy()) {
        let mut merged = value.clone();
        deep_merge(&mut merged, &value);
        prop_assert_eq!(merged, value);
    }

    #[test]
    fn deep_merge_source_wins_on_leaves(target in value_strategy(), source in leaf_strategy()) {
        let mut merged = target;
        deep_merge(&mut merged, &source);
        prop_assert_eq!(merged, source);
    }
}
