//! In-memory controls.
//!
//! [`FieldControl`] holds a single value; [`GroupControl`] and
//! [`ArrayControl`] hold children and derive their value, status and
//! dirtiness from them. A composite re-emits its own value and status
//! whenever a child emits, so observing the root observes the whole tree.
//!
//! Validation rules are not modelled: errors are set explicitly with
//! `set_errors`.

use super::{Control, ControlChildren, ControlRef, ControlStatus, UpdateOptions};
use crate::stream::{Emitter, EventStream, Subscription};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Default)]
struct Flags {
    dirty: bool,
    disabled: bool,
    errors: Option<Value>,
}

impl Flags {
    fn own_status(&self) -> ControlStatus {
        if self.disabled {
            ControlStatus::Disabled
        } else if self.errors.is_some() {
            ControlStatus::Invalid
        } else {
            ControlStatus::Valid
        }
    }
}

/// A leaf control.
pub struct FieldControl {
    value: RwLock<Value>,
    flags: RwLock<Flags>,
    value_changes: Emitter<Value>,
    status_changes: Emitter<ControlStatus>,
}

impl FieldControl {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(value),
            flags: RwLock::new(Flags::default()),
            value_changes: Emitter::new(),
            status_changes: Emitter::new(),
        })
    }

    /// Replace the validation errors and emit the resulting status.
    pub fn set_errors(&self, errors: Option<Value>) {
        self.flags.write().errors = errors;
        self.status_changes.emit(&self.status());
    }

    /// Mark as dirty. Like a user edit, this does not emit by itself.
    pub fn mark_dirty(&self) {
        self.flags.write().dirty = true;
    }

    pub fn mark_pristine(&self) {
        self.flags.write().dirty = false;
    }

    pub fn disable(&self) {
        self.flags.write().disabled = true;
        self.emit(UpdateOptions::default());
    }

    pub fn enable(&self) {
        self.flags.write().disabled = false;
        self.emit(UpdateOptions::default());
    }

    fn emit(&self, options: UpdateOptions) {
        if options.emit_event {
            self.value_changes.emit(&self.value());
            self.status_changes.emit(&self.status());
        }
    }
}

impl Control for FieldControl {
    fn value(&self) -> Value {
        self.value.read().clone()
    }

    fn status(&self) -> ControlStatus {
        self.flags.read().own_status()
    }

    fn dirty(&self) -> bool {
        self.flags.read().dirty
    }

    fn errors(&self) -> Option<Value> {
        self.flags.read().errors.clone()
    }

    fn children(&self) -> ControlChildren {
        ControlChildren::None
    }

    fn patch_value(&self, value: &Value, options: UpdateOptions) {
        self.set_value(value, options);
    }

    fn set_value(&self, value: &Value, options: UpdateOptions) {
        *self.value.write() = value.clone();
        self.emit(options);
    }

    fn value_changes(&self) -> EventStream<Value> {
        self.value_changes.stream()
    }

    fn status_changes(&self) -> EventStream<ControlStatus> {
        self.status_changes.stream()
    }
}

/// State and event plumbing shared by group and array controls.
struct Composite {
    flags: RwLock<Flags>,
    /// Set while the composite updates its own children, so their events
    /// are folded into a single emission by the composite.
    batching: Arc<AtomicBool>,
    value_changes: Emitter<Value>,
    status_changes: Emitter<ControlStatus>,
}

impl Composite {
    fn new() -> Self {
        Self {
            flags: RwLock::new(Flags::default()),
            batching: Arc::new(AtomicBool::new(false)),
            value_changes: Emitter::new(),
            status_changes: Emitter::new(),
        }
    }

    /// Re-emit the parent's value and status whenever `child` emits.
    fn link(&self, child: &ControlRef, parent: Weak<dyn Control>) -> Subscription {
        let values = self.value_changes.clone();
        let value_parent = parent.clone();
        let value_batching = Arc::clone(&self.batching);
        let on_value = child.value_changes().subscribe(move |_| {
            if value_batching.load(Ordering::Acquire) {
                return;
            }
            if let Some(parent) = value_parent.upgrade() {
                values.emit(&parent.value());
            }
        });

        let statuses = self.status_changes.clone();
        let status_batching = Arc::clone(&self.batching);
        let on_status = child.status_changes().subscribe(move |_| {
            if status_batching.load(Ordering::Acquire) {
                return;
            }
            if let Some(parent) = parent.upgrade() {
                statuses.emit(&parent.status());
            }
        });

        on_value.join(on_status)
    }

    fn batch(&self, update: impl FnOnce()) {
        self.batching.store(true, Ordering::Release);
        update();
        self.batching.store(false, Ordering::Release);
    }

    fn status<'a>(&self, mut children: impl Iterator<Item = &'a ControlRef>) -> ControlStatus {
        let flags = self.flags.read();
        match flags.own_status() {
            ControlStatus::Valid
                if children.any(|child| child.status() == ControlStatus::Invalid) =>
            {
                ControlStatus::Invalid
            }
            status => status,
        }
    }

    fn dirty<'a>(&self, mut children: impl Iterator<Item = &'a ControlRef>) -> bool {
        self.flags.read().dirty || children.any(|child| child.dirty())
    }

    fn emit(&self, control: &dyn Control, options: UpdateOptions) {
        if options.emit_event {
            self.value_changes.emit(&control.value());
            self.status_changes.emit(&control.status());
        }
    }
}

fn child_options(options: UpdateOptions) -> UpdateOptions {
    UpdateOptions {
        only_self: true,
        emit_event: options.emit_event,
    }
}

struct GroupChild {
    name: String,
    control: ControlRef,
    _link: Subscription,
}

/// A control with named children, kept in insertion order.
pub struct GroupControl {
    this: Weak<GroupControl>,
    children: RwLock<Vec<GroupChild>>,
    composite: Composite,
}

impl GroupControl {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            children: RwLock::new(Vec::new()),
            composite: Composite::new(),
        })
    }

    /// Add a child under `name`. An existing child with that name is kept
    /// and `false` returned.
    pub fn add_control(&self, name: impl Into<String>, control: ControlRef) -> bool {
        let name = name.into();
        {
            let mut children = self.children.write();
            if children.iter().any(|child| child.name == name) {
                return false;
            }
            let parent: Weak<dyn Control> = self.this.clone();
            let link = self.composite.link(&control, parent);
            children.push(GroupChild {
                name,
                control,
                _link: link,
            });
        }
        self.composite.emit(self, UpdateOptions::default());
        true
    }

    /// The child registered under `name`.
    pub fn get(&self, name: &str) -> Option<ControlRef> {
        self.children
            .read()
            .iter()
            .find(|child| child.name == name)
            .map(|child| Arc::clone(&child.control))
    }

    pub fn set_errors(&self, errors: Option<Value>) {
        self.composite.flags.write().errors = errors;
        self.composite.status_changes.emit(&self.status());
    }

    pub fn mark_dirty(&self) {
        self.composite.flags.write().dirty = true;
    }

    pub fn disable(&self) {
        self.composite.flags.write().disabled = true;
        self.composite.emit(self, UpdateOptions::default());
    }

    pub fn enable(&self) {
        self.composite.flags.write().disabled = false;
        self.composite.emit(self, UpdateOptions::default());
    }

    fn controls(&self) -> Vec<(String, ControlRef)> {
        self.children
            .read()
            .iter()
            .map(|child| (child.name.clone(), Arc::clone(&child.control)))
            .collect()
    }
}

impl Control for GroupControl {
    fn value(&self) -> Value {
        let value: Map<String, Value> = self
            .controls()
            .into_iter()
            .map(|(name, control)| (name, control.value()))
            .collect();
        Value::Object(value)
    }

    fn status(&self) -> ControlStatus {
        let controls = self.controls();
        self.composite.status(controls.iter().map(|(_, control)| control))
    }

    fn dirty(&self) -> bool {
        let controls = self.controls();
        self.composite.dirty(controls.iter().map(|(_, control)| control))
    }

    fn errors(&self) -> Option<Value> {
        self.composite.flags.read().errors.clone()
    }

    fn children(&self) -> ControlChildren {
        ControlChildren::Group(self.controls())
    }

    fn patch_value(&self, value: &Value, options: UpdateOptions) {
        let controls = self.controls();
        self.composite.batch(|| {
            for (name, control) in &controls {
                if let Some(child_value) = value.get(name.as_str()) {
                    control.patch_value(child_value, child_options(options));
                }
            }
        });
        self.composite.emit(self, options);
    }

    fn set_value(&self, value: &Value, options: UpdateOptions) {
        let controls = self.controls();
        self.composite.batch(|| {
            for (name, control) in &controls {
                let child_value = value.get(name.as_str()).unwrap_or(&Value::Null);
                control.set_value(child_value, child_options(options));
            }
        });
        self.composite.emit(self, options);
    }

    fn value_changes(&self) -> EventStream<Value> {
        self.composite.value_changes.stream()
    }

    fn status_changes(&self) -> EventStream<ControlStatus> {
        self.composite.status_changes.stream()
    }
}

struct ArrayChild {
    control: ControlRef,
    _link: Subscription,
}

/// A control with positional children.
///
/// Patching never resizes the array: values beyond the current length are
/// ignored. Use [`ArrayControl::push`] or [`Control::insert_at`] to grow it.
pub struct ArrayControl {
    this: Weak<ArrayControl>,
    children: RwLock<Vec<ArrayChild>>,
    composite: Composite,
}

impl ArrayControl {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            children: RwLock::new(Vec::new()),
            composite: Composite::new(),
        })
    }

    pub fn push(&self, control: ControlRef) {
        let index = self.len();
        self.insert_at(index, control, UpdateOptions::default());
    }

    /// Remove and return the child at `index`.
    pub fn remove_at(&self, index: usize) -> Option<ControlRef> {
        let removed = {
            let mut children = self.children.write();
            if index >= children.len() {
                return None;
            }
            children.remove(index).control
        };
        self.composite.emit(self, UpdateOptions::default());
        Some(removed)
    }

    pub fn at(&self, index: usize) -> Option<ControlRef> {
        self.children
            .read()
            .get(index)
            .map(|child| Arc::clone(&child.control))
    }

    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_errors(&self, errors: Option<Value>) {
        self.composite.flags.write().errors = errors;
        self.composite.status_changes.emit(&self.status());
    }

    pub fn mark_dirty(&self) {
        self.composite.flags.write().dirty = true;
    }

    fn controls(&self) -> Vec<ControlRef> {
        self.children
            .read()
            .iter()
            .map(|child| Arc::clone(&child.control))
            .collect()
    }
}

impl Control for ArrayControl {
    fn value(&self) -> Value {
        Value::Array(self.controls().iter().map(|control| control.value()).collect())
    }

    fn status(&self) -> ControlStatus {
        let controls = self.controls();
        self.composite.status(controls.iter())
    }

    fn dirty(&self) -> bool {
        let controls = self.controls();
        self.composite.dirty(controls.iter())
    }

    fn errors(&self) -> Option<Value> {
        self.composite.flags.read().errors.clone()
    }

    fn children(&self) -> ControlChildren {
        ControlChildren::Array(self.controls())
    }

    fn patch_value(&self, value: &Value, options: UpdateOptions) {
        let Some(items) = value.as_array() else {
            return;
        };
        let controls = self.controls();
        self.composite.batch(|| {
            for (control, item) in controls.iter().zip(items) {
                control.patch_value(item, child_options(options));
            }
        });
        self.composite.emit(self, options);
    }

    fn set_value(&self, value: &Value, options: UpdateOptions) {
        let items = value.as_array().map(Vec::as_slice).unwrap_or(&[]);
        let controls = self.controls();
        self.composite.batch(|| {
            for (index, control) in controls.iter().enumerate() {
                let item = items.get(index).unwrap_or(&Value::Null);
                control.set_value(item, child_options(options));
            }
        });
        self.composite.emit(self, options);
    }

    fn insert_at(&self, index: usize, control: ControlRef, options: UpdateOptions) -> bool {
        {
            let mut children = self.children.write();
            let index = index.min(children.len());
            let parent: Weak<dyn Control> = self.this.clone();
            let link = self.composite.link(&control, parent);
            children.insert(
                index,
                ArrayChild {
                    control,
                    _link: link,
                },
            );
        }
        self.composite.emit(self, options);
        true
    }

    fn value_changes(&self) -> EventStream<Value> {
        self.composite.value_changes.stream()
    }

    fn status_changes(&self) -> EventStream<ControlStatus> {
        self.composite.status_changes.stream()
    }
}
