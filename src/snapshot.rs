//! Serializable mirrors of live control trees.

use crate::util::deep_merge;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Store contents: one snapshot per registration name.
pub type StoreState = BTreeMap<String, Snapshot>;

/// Persisted layout: registration name to stripped (value-only) snapshot.
pub type PersistedState = serde_json::Map<String, Value>;

/// Status fields shared by every snapshot node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub value: Value,
    pub valid: bool,
    pub dirty: bool,
    pub disabled: bool,
    #[serde(default)]
    pub errors: Option<Value>,
}

/// One node of a snapshot tree.
///
/// The variant always matches the kind of live control it was taken from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Snapshot {
    Leaf {
        state: NodeState,
    },
    /// Named children, in insertion order.
    Group {
        state: NodeState,
        controls: Vec<(String, Snapshot)>,
    },
    /// Positional children.
    Array {
        state: NodeState,
        controls: Vec<Snapshot>,
    },
}

impl Snapshot {
    pub fn leaf(state: NodeState) -> Self {
        Snapshot::Leaf { state }
    }

    pub fn state(&self) -> &NodeState {
        match self {
            Snapshot::Leaf { state }
            | Snapshot::Group { state, .. }
            | Snapshot::Array { state, .. } => state,
        }
    }

    fn state_mut(&mut self) -> &mut NodeState {
        match self {
            Snapshot::Leaf { state }
            | Snapshot::Group { state, .. }
            | Snapshot::Array { state, .. } => state,
        }
    }

    pub fn value(&self) -> &Value {
        &self.state().value
    }

    pub fn valid(&self) -> bool {
        self.state().valid
    }

    pub fn dirty(&self) -> bool {
        self.state().dirty
    }

    pub fn disabled(&self) -> bool {
        self.state().disabled
    }

    pub fn errors(&self) -> Option<&Value> {
        self.state().errors.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Snapshot::Leaf { .. })
    }

    /// Direct child addressed by `key`: a name for groups, a decimal index
    /// for arrays. Leaves have no children.
    pub fn child(&self, key: &str) -> Option<&Snapshot> {
        match self {
            Snapshot::Leaf { .. } => None,
            Snapshot::Group { controls, .. } => controls
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, child)| child),
            Snapshot::Array { controls, .. } => {
                key.parse::<usize>().ok().and_then(|index| controls.get(index))
            }
        }
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        match self {
            Snapshot::Leaf { .. } => 0,
            Snapshot::Group { controls, .. } => controls.len(),
            Snapshot::Array { controls, .. } => controls.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The persisted form: value-shaped data with every status field
    /// dropped.
    pub fn stripped(&self) -> Value {
        self.value().clone()
    }

    /// Deep-merge a previously persisted value over this snapshot.
    ///
    /// Persisted data wins on conflicting leaves. Children present in both
    /// are merged recursively so their values stay consistent with the
    /// parent's.
    pub fn merge_value(&mut self, saved: &Value) {
        deep_merge(&mut self.state_mut().value, saved);

        match self {
            Snapshot::Leaf { .. } => {}
            Snapshot::Group { controls, .. } => {
                for (name, child) in controls.iter_mut() {
                    if let Some(saved) = saved.get(name.as_str()) {
                        child.merge_value(saved);
                    }
                }
            }
            Snapshot::Array { controls, .. } => {
                for (index, child) in controls.iter_mut().enumerate() {
                    if let Some(saved) = saved.get(index) {
                        child.merge_value(saved);
                    }
                }
            }
        }
    }
}

/// Strip every entry of a store down to its persisted form.
pub fn strip_store(state: &StoreState) -> PersistedState {
    state
        .iter()
        .map(|(name, snapshot)| (name.clone(), snapshot.stripped()))
        .collect()
}
