//! Registration of live controls and the streams derived from them.
//!
//! [`FormManager`] owns, per registration name, the live control, the one
//! active subscription that mirrors it into the [`StateStore`], and the
//! optionally captured initial value. A name is either unregistered or
//! registered; `upsert` registers it and `unsubscribe`/`destroy` return it
//! to unregistered.

use crate::bridge::{apply_stored_value, remove_entries, to_snapshot};
use crate::config::{SyncConfig, UpsertOptions};
use crate::control::{Control, ControlRef, ControlStatus, UpdateOptions};
use crate::path::resolve_opt;
use crate::persist::{MemoryStorage, Persistence, Storage};
use crate::snapshot::{PersistedState, Snapshot, StoreState};
use crate::store::StateStore;
use crate::stream::{Emitter, EventStream, Subscription};
use crate::util::Target;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Teardown notice broadcast by [`FormManager::unsubscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DestroySignal {
    /// One registration was torn down.
    Name(String),
    /// Every registration was torn down.
    All,
}

impl DestroySignal {
    /// Whether a listener for `name` should observe this signal.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            DestroySignal::Name(destroyed) => destroyed == name,
            DestroySignal::All => true,
        }
    }
}

/// Live state of a registered name.
struct Registration {
    control: ControlRef,
    /// Cancelled when the registration is dropped.
    _subscription: Subscription,
}

/// Keeps a snapshot store in sync with any number of named live controls.
pub struct FormManager {
    config: SyncConfig,
    store: StateStore,
    persistence: Persistence,
    registry: Mutex<HashMap<String, Registration>>,
    initial_values: Arc<RwLock<HashMap<String, Value>>>,
    /// Names already warned about a missing initial value.
    warned_initial: Mutex<HashSet<String>>,
    destroyed: Emitter<DestroySignal>,
}

impl FormManager {
    /// A manager with built-in defaults persisting into `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(SyncConfig::default(), storage)
    }

    /// A manager with injected defaults persisting into `storage`.
    pub fn with_config(config: SyncConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            store: StateStore::new(),
            persistence: Persistence::new(storage),
            registry: Mutex::new(HashMap::new()),
            initial_values: Arc::new(RwLock::new(HashMap::new())),
            warned_initial: Mutex::new(HashSet::new()),
            destroyed: Emitter::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    // --- Registration ---

    /// Register `control` under `name`, or hand a registered name a new
    /// control instance.
    ///
    /// A name that already has a snapshot in the store (a live
    /// registration, or one re-hydrated from durable storage) pushes that
    /// snapshot's value onto `control` silently; otherwise a fresh snapshot
    /// is stored. Any previous subscription for `name` is cancelled before
    /// the new one is installed.
    pub fn upsert(
        &self,
        name: impl Into<String>,
        control: ControlRef,
        options: UpsertOptions,
    ) -> &Self {
        let name = name.into();
        let config = self.config.resolve(&options);

        if config.with_initial_value {
            self.initial_values
                .write()
                .entry(name.clone())
                .or_insert_with(|| control.value());
        }

        let previous = self.registry.lock().remove(&name);
        let registered = previous.is_some();
        drop(previous);

        let hydrated =
            config.persist_state && !registered && self.hydrate(&name, control.as_ref(), &config);

        match self.store.get(&name) {
            Some(stored) => {
                tracing::debug!(name = %name, "pushing stored state onto control");
                apply_stored_value(control.as_ref(), &stored, config.array_factory.as_ref(), &name);
                if hydrated {
                    // Arrays may have grown; store the reconciled tree.
                    self.store.insert(name.clone(), to_snapshot(control.as_ref()));
                }
            }
            None => {
                let snapshot = to_snapshot(control.as_ref());
                self.store.insert(name.clone(), snapshot.clone());
                self.persistence
                    .update_entry(&config.storage_key, &name, &snapshot, config.persist_state);
            }
        }

        let subscription = self.mirror(&name, &control, &config);
        self.registry.lock().insert(
            name.clone(),
            Registration {
                control,
                _subscription: subscription,
            },
        );

        tracing::debug!(
            name = %name,
            persist = config.persist_state,
            debounce_ms = config.debounce_time.as_millis() as u64,
            "control registered"
        );
        self
    }

    /// Seed the store from durable storage, merging the saved value over a
    /// fresh snapshot of `control`. Returns whether an entry was found.
    fn hydrate(&self, name: &str, control: &dyn Control, config: &SyncConfig) -> bool {
        let persisted = self.persistence.read(&config.storage_key);
        let Some(saved) = persisted.get(name) else {
            return false;
        };

        let mut snapshot = to_snapshot(control);
        snapshot.merge_value(saved);
        self.store.insert(name, snapshot);
        tracing::debug!(name = %name, key = %config.storage_key, "re-hydrated from storage");
        true
    }

    /// Subscribe to `control` so every (debounced) change is written to the
    /// store and, if enabled, persisted.
    fn mirror(&self, name: &str, control: &ControlRef, config: &SyncConfig) -> Subscription {
        let changes = control
            .value_changes()
            .map(|_| ())
            .merge(&control.status_changes().distinct_until_changed().map(|_: &ControlStatus| ()))
            .debounce(config.debounce_time);

        let weak = Arc::downgrade(control);
        let store = self.store.clone();
        let persistence = self.persistence.clone();
        let name = name.to_string();
        let key = config.storage_key.clone();
        let persist = config.persist_state;

        changes.subscribe(move |_| {
            let Some(control) = weak.upgrade() else {
                return;
            };
            let snapshot = to_snapshot(control.as_ref());
            store.insert(name.clone(), snapshot.clone());
            persistence.update_entry(&key, &name, &snapshot, persist);
        })
    }

    /// Stop mirroring the targeted names and broadcast their destruction.
    ///
    /// With [`Target::All`] every registered name is dropped and a single
    /// [`DestroySignal::All`] is broadcast.
    ///
    /// Returns once any debounced write already in flight for those names
    /// has landed; nothing is written for them afterwards.
    pub fn unsubscribe(&self, target: impl Into<Target>) {
        let target = target.into();

        let removed: Vec<(String, Registration)> = {
            let mut registry = self.registry.lock();
            match target.names() {
                Some(names) => names
                    .iter()
                    .filter_map(|name| registry.remove_entry(name))
                    .collect(),
                None => registry.drain().collect(),
            }
        };

        for (name, registration) in removed {
            drop(registration);
            tracing::debug!(name = %name, "control unsubscribed");
        }

        match target {
            Target::All => self.destroyed.emit(&DestroySignal::All),
            Target::Names(names) => {
                for name in names {
                    self.destroyed.emit(&DestroySignal::Name(name));
                }
            }
        }
    }

    /// Remove the targeted snapshots from the store (or empty it), persist
    /// the resulting store and forget the targeted initial values.
    ///
    /// The whole store is written to the default storage key regardless of
    /// any registration's persistence setting.
    pub fn clear(&self, target: impl Into<Target>) {
        let target = target.into();

        let next = match target.names() {
            Some(names) => remove_entries(&self.store.get_all(), names),
            None => StoreState::new(),
        };
        self.store.set_all(next);
        self.persistence
            .write_store(&self.config.storage_key, &self.store.get_all());

        let mut initial_values = self.initial_values.write();
        match target.names() {
            Some(names) => {
                for name in names {
                    initial_values.remove(name);
                }
            }
            None => initial_values.clear(),
        }
        tracing::debug!(names = ?target, "store cleared");
    }

    /// [`unsubscribe`](Self::unsubscribe) then [`clear`](Self::clear).
    pub fn destroy(&self, target: impl Into<Target>) {
        let target = target.into();
        self.unsubscribe(target.clone());
        self.clear(target);
    }

    // --- Derived streams ---

    /// The node at `path` under `name`, skipping absence and consecutive
    /// duplicates.
    fn node_changes(&self, name: &str, path: Option<&str>) -> EventStream<Snapshot> {
        let path = path.map(str::to_string);
        self.store
            .select(name)
            .filter_map(move |entry| resolve_opt(entry.as_ref(), path.as_deref()).cloned())
            .distinct_until_changed()
    }

    pub fn control_changes(&self, name: &str, path: Option<&str>) -> EventStream<Snapshot> {
        self.node_changes(name, path)
    }

    pub fn value_changes(&self, name: &str, path: Option<&str>) -> EventStream<Value> {
        self.node_changes(name, path).map(|node| node.value().clone())
    }

    pub fn validity_changes(&self, name: &str, path: Option<&str>) -> EventStream<bool> {
        self.node_changes(name, path).map(Snapshot::valid)
    }

    pub fn dirty_changes(&self, name: &str, path: Option<&str>) -> EventStream<bool> {
        self.node_changes(name, path).map(Snapshot::dirty)
    }

    pub fn disable_changes(&self, name: &str, path: Option<&str>) -> EventStream<bool> {
        self.node_changes(name, path).map(Snapshot::disabled)
    }

    pub fn errors_changes(&self, name: &str, path: Option<&str>) -> EventStream<Option<Value>> {
        self.node_changes(name, path).map(|node| node.errors().cloned())
    }

    /// Whether the value under `name` differs from its captured initial
    /// value, on every value change.
    ///
    /// Without a captured initial value every value counts as changed; a
    /// warning is logged the first time this happens for a name.
    pub fn initial_value_changed(&self, name: &str) -> EventStream<bool> {
        if !self.initial_values.read().contains_key(name)
            && self.warned_initial.lock().insert(name.to_string())
        {
            tracing::warn!(
                name = %name,
                "no initial value captured; register with `with_initial_value` to track changes"
            );
        }

        let initial_values = Arc::clone(&self.initial_values);
        let name = name.to_string();
        self.value_changes(&name, None)
            .map(move |value| initial_values.read().get(&name) != Some(value))
    }

    /// Destroy signals concerning `name`.
    pub fn control_destroyed(&self, name: &str) -> EventStream<DestroySignal> {
        let name = name.to_string();
        self.destroyed
            .stream()
            .filter(move |signal| signal.matches(&name))
    }

    // --- Synchronous access ---

    /// The current snapshot under `name`, resolved through `path`.
    pub fn get_control(&self, name: &str, path: Option<&str>) -> Option<Snapshot> {
        let state = self.store.get_all();
        resolve_opt(state.get(name), path).cloned()
    }

    pub fn has_control(&self, name: &str, path: Option<&str>) -> bool {
        let state = self.store.get_all();
        resolve_opt(state.get(name), path).is_some()
    }

    /// Patch the live control registered under `name`. Returns `false`
    /// (and does nothing) when `name` is not registered.
    pub fn patch_value(&self, name: &str, value: &Value, options: UpdateOptions) -> bool {
        match self.control(name) {
            Some(control) => {
                control.patch_value(value, options);
                true
            }
            None => false,
        }
    }

    /// Replace the value of the live control registered under `name`.
    /// Returns `false` (and does nothing) when `name` is not registered.
    pub fn set_value(&self, name: &str, value: &Value, options: UpdateOptions) -> bool {
        match self.control(name) {
            Some(control) => {
                control.set_value(value, options);
                true
            }
            None => false,
        }
    }

    // --- Introspection ---

    /// The live control registered under `name`.
    pub fn control(&self, name: &str) -> Option<ControlRef> {
        self.registry
            .lock()
            .get(name)
            .map(|registration| Arc::clone(&registration.control))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.lock().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn initial_value(&self, name: &str) -> Option<Value> {
        self.initial_values.read().get(name).cloned()
    }

    /// The persisted blob under the default storage key.
    pub fn persisted_state(&self) -> PersistedState {
        self.persistence.read(&self.config.storage_key)
    }
}

impl Default for FormManager {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }
}

impl std::fmt::Debug for FormManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormManager")
            .field("registered", &self.registered_names())
            .field("store", &self.store)
            .field("persistence", &self.persistence)
            .finish()
    }
}
