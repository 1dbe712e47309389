//! Conversion between live control trees and store snapshots.

use crate::control::{ArrayFactory, Control, ControlChildren, UpdateOptions};
use crate::snapshot::{NodeState, Snapshot, StoreState};
use serde_json::Value;

/// Take a snapshot of `control` and, recursively, of all its children.
pub fn to_snapshot(control: &dyn Control) -> Snapshot {
    let state = NodeState {
        value: control.value(),
        valid: control.valid(),
        dirty: control.dirty(),
        disabled: control.disabled(),
        errors: control.errors(),
    };

    match control.children() {
        ControlChildren::None => Snapshot::Leaf { state },
        ControlChildren::Group(children) => Snapshot::Group {
            state,
            controls: children
                .iter()
                .map(|(name, child)| (name.clone(), to_snapshot(child.as_ref())))
                .collect(),
        },
        ControlChildren::Array(children) => Snapshot::Array {
            state,
            controls: children
                .iter()
                .map(|child| to_snapshot(child.as_ref()))
                .collect(),
        },
    }
}

/// Push a stored snapshot's value onto a live control without emitting
/// change events.
///
/// Array-like controls do not grow when patched, so any stored element
/// without a live counterpart is first created through `factory` and
/// inserted at its index. `field` names the control for per-field
/// factories; nested arrays are looked up by their key in the parent group.
pub fn apply_stored_value(
    control: &dyn Control,
    stored: &Snapshot,
    factory: Option<&ArrayFactory>,
    field: &str,
) {
    reconcile(control, stored.value(), factory, field);
    control.patch_value(stored.value(), UpdateOptions::silent());
}

fn reconcile(control: &dyn Control, stored: &Value, factory: Option<&ArrayFactory>, field: &str) {
    match control.children() {
        ControlChildren::None => {}
        ControlChildren::Group(children) => {
            for (name, child) in &children {
                if let Some(stored) = stored.get(name.as_str()) {
                    reconcile(child.as_ref(), stored, factory, name);
                }
            }
        }
        ControlChildren::Array(children) => {
            let Some(items) = stored.as_array() else {
                return;
            };

            for (index, item) in items.iter().enumerate() {
                if let Some(child) = children.get(index) {
                    reconcile(child.as_ref(), item, factory, field);
                    continue;
                }

                let Some(create) = factory.and_then(|factory| factory.for_field(field)) else {
                    tracing::debug!(
                        field = %field,
                        stored = items.len(),
                        live = index,
                        "no array factory, stored elements left unapplied"
                    );
                    return;
                };

                let child = create(item);
                reconcile(child.as_ref(), item, factory, field);
                if !control.insert_at(index, child, UpdateOptions::silent()) {
                    return;
                }
            }
        }
    }
}

/// A copy of `state` without the entries for `names`.
pub fn remove_entries<I, S>(state: &StoreState, names: I) -> StoreState
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut remaining = state.clone();
    for name in names {
        remaining.remove(name.as_ref());
    }
    remaining
}
