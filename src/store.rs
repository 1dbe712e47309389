//! Keyed observable container for snapshots.
//!
//! The store holds one [`StoreState`] mapping. Every mutation replaces the
//! mapping and notifies listeners before the mutating call returns.
//! Mutations are serialized; a listener may read the store, and may also
//! write to it from the notifying thread.

use crate::snapshot::{Snapshot, StoreState};
use crate::stream::{Emitter, EventStream, Listener};
use parking_lot::{ReentrantMutex, RwLock};
use std::sync::Arc;

struct StoreInner {
    state: RwLock<Arc<StoreState>>,
    /// Serializes mutation plus notification.
    write_lock: ReentrantMutex<()>,
    changes: Emitter<Arc<StoreState>>,
}

/// Observable snapshot store. Clones share the same state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_state(StoreState::new())
    }

    pub fn with_state(state: StoreState) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(Arc::new(state)),
                write_lock: ReentrantMutex::new(()),
                changes: Emitter::new(),
            }),
        }
    }

    /// The current mapping.
    pub fn get_all(&self) -> Arc<StoreState> {
        Arc::clone(&self.inner.state.read())
    }

    /// The snapshot stored under `name`.
    pub fn get(&self, name: &str) -> Option<Snapshot> {
        self.inner.state.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.state.read().contains_key(name)
    }

    /// Replace the whole mapping.
    pub fn set_all(&self, state: StoreState) {
        self.write(|_| state);
    }

    /// Shallow-merge top-level entries into the mapping.
    pub fn update(&self, partial: StoreState) {
        self.write(|current| {
            let mut next = current.clone();
            next.extend(partial);
            next
        });
    }

    /// Store a single entry.
    pub fn insert(&self, name: impl Into<String>, snapshot: Snapshot) {
        let name = name.into();
        self.write(move |current| {
            let mut next = current.clone();
            next.insert(name, snapshot);
            next
        });
    }

    /// Every future mapping, as it is written.
    pub fn changes(&self) -> EventStream<Arc<StoreState>> {
        self.inner.changes.stream()
    }

    /// The entry under `name`: its current value on subscription, then its
    /// value after every write, absence included.
    pub fn select(&self, name: &str) -> EventStream<Option<Snapshot>> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        EventStream::new(move |listener: Listener<Option<Snapshot>>| {
            let _guard = inner.write_lock.lock();

            let current = inner.state.read().get(&name).cloned();
            let entry_name = name.clone();
            let on_change = Arc::clone(&listener);
            let subscription = inner
                .changes
                .stream()
                .subscribe(move |state| on_change(&state.get(&entry_name).cloned()));

            listener(&current);
            subscription
        })
    }

    fn write(&self, next: impl FnOnce(&StoreState) -> StoreState) {
        let _guard = self.inner.write_lock.lock();

        let state = {
            let mut slot = self.inner.state.write();
            let state = Arc::new(next(&slot));
            *slot = Arc::clone(&state);
            state
        };

        self.inner.changes.emit(&state);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("names", &self.get_all().keys().collect::<Vec<_>>())
            .finish()
    }
}
