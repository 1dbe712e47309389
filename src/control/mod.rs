//! The live control capability.
//!
//! A [`Control`] is a mutable, observable node of a form tree: a leaf
//! field, a group of named children or an array of positional children.
//! The synchronization engine only talks to controls through this trait;
//! [`memory`] provides in-process implementations.

pub mod memory;

use crate::stream::EventStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use memory::{ArrayControl, FieldControl, GroupControl};

/// Shared handle to a live control.
pub type ControlRef = Arc<dyn Control>;

/// Builds a new array element control from the value it should hold.
pub type ControlFactory = Arc<dyn Fn(&Value) -> ControlRef + Send + Sync>;

/// Validation status of a control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlStatus {
    Valid,
    Invalid,
    Disabled,
}

/// Options accepted by value updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update only this control, without recomputing its ancestors.
    pub only_self: bool,
    /// Emit value and status change events.
    pub emit_event: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            only_self: false,
            emit_event: true,
        }
    }
}

impl UpdateOptions {
    /// Update without emitting any events.
    pub fn silent() -> Self {
        Self {
            only_self: false,
            emit_event: false,
        }
    }
}

/// Shape of a control, with its direct children.
#[derive(Clone)]
pub enum ControlChildren {
    None,
    Group(Vec<(String, ControlRef)>),
    Array(Vec<ControlRef>),
}

impl fmt::Debug for ControlChildren {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlChildren::None => write!(f, "None"),
            ControlChildren::Group(children) => f
                .debug_tuple("Group")
                .field(&children.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
                .finish(),
            ControlChildren::Array(children) => write!(f, "Array(len={})", children.len()),
        }
    }
}

/// A live, observable form control.
pub trait Control: Send + Sync {
    fn value(&self) -> Value;

    fn status(&self) -> ControlStatus;

    fn valid(&self) -> bool {
        self.status() == ControlStatus::Valid
    }

    fn dirty(&self) -> bool;

    fn disabled(&self) -> bool {
        self.status() == ControlStatus::Disabled
    }

    fn errors(&self) -> Option<Value>;

    fn children(&self) -> ControlChildren;

    /// Apply the parts of `value` that match this control's shape.
    fn patch_value(&self, value: &Value, options: UpdateOptions);

    /// Replace this control's whole value.
    fn set_value(&self, value: &Value, options: UpdateOptions);

    /// Insert a child at `index`. Only array-like controls accept children;
    /// everything else returns `false`.
    fn insert_at(&self, index: usize, control: ControlRef, options: UpdateOptions) -> bool {
        let _ = (index, control, options);
        false
    }

    fn value_changes(&self) -> EventStream<Value>;

    fn status_changes(&self) -> EventStream<ControlStatus>;
}

/// Creates array element controls when stored arrays are longer than the
/// live ones.
#[derive(Clone)]
pub enum ArrayFactory {
    /// One factory for every array.
    Global(ControlFactory),
    /// Factories keyed by the array's field name.
    PerField(HashMap<String, ControlFactory>),
}

impl ArrayFactory {
    pub fn global(factory: impl Fn(&Value) -> ControlRef + Send + Sync + 'static) -> Self {
        ArrayFactory::Global(Arc::new(factory))
    }

    /// An empty per-field factory; add fields with [`ArrayFactory::with_field`].
    pub fn per_field() -> Self {
        ArrayFactory::PerField(HashMap::new())
    }

    /// Register the factory for arrays stored under `field`.
    ///
    /// A global factory is replaced by a per-field one.
    pub fn with_field(
        self,
        field: impl Into<String>,
        factory: impl Fn(&Value) -> ControlRef + Send + Sync + 'static,
    ) -> Self {
        let mut factories = match self {
            ArrayFactory::PerField(factories) => factories,
            ArrayFactory::Global(_) => HashMap::new(),
        };
        factories.insert(field.into(), Arc::new(factory));
        ArrayFactory::PerField(factories)
    }

    /// The factory for the array stored under `field`.
    pub fn for_field(&self, field: &str) -> Option<&ControlFactory> {
        match self {
            ArrayFactory::Global(factory) => Some(factory),
            ArrayFactory::PerField(factories) => factories.get(field),
        }
    }
}

impl fmt::Debug for ArrayFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayFactory::Global(_) => write!(f, "ArrayFactory::Global"),
            ArrayFactory::PerField(factories) => {
                let mut fields: Vec<&str> = factories.keys().map(String::as_str).collect();
                fields.sort_unstable();
                f.debug_tuple("ArrayFactory::PerField").field(&fields).finish()
            }
        }
    }
}
