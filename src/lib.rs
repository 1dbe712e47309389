//! # Form Sync
//!
//! Keeps an observable snapshot store in sync with live, tree-shaped form
//! controls, and optionally mirrors it into durable storage.
//!
//! ## Core Concepts
//!
//! - **Controls**: Live field, group and array controls that emit value and
//!   status changes
//! - **Snapshots**: Plain, serializable copies of a control tree
//! - **Store**: A keyed, observable container of snapshots
//! - **Manager**: Registers controls by name and derives change streams
//!
//! ## Example
//!
//! ```ignore
//! use formsync::{FieldControl, FormManager, GroupControl, UpsertOptions};
//! use serde_json::json;
//!
//! let manager = FormManager::default();
//!
//! let login = GroupControl::new();
//! login.add_control("email", FieldControl::new(json!("")));
//! manager.upsert("login", login, UpsertOptions::new().persist(true));
//!
//! // Observe a nested field
//! let emails = manager.value_changes("login", Some("email")).watch();
//! ```

pub mod bridge;
pub mod config;
pub mod control;
pub mod error;
pub mod manager;
pub mod path;
pub mod persist;
pub mod snapshot;
pub mod store;
pub mod stream;
pub mod util;

// Re-exports
pub use bridge::{apply_stored_value, remove_entries, to_snapshot};
pub use config::{SyncConfig, UpsertOptions, DEFAULT_STORAGE_KEY};
pub use control::{
    ArrayControl, ArrayFactory, Control, ControlChildren, ControlFactory, ControlRef,
    ControlStatus, FieldControl, GroupControl, UpdateOptions,
};
pub use error::{Result, SyncError};
pub use manager::{DestroySignal, FormManager};
pub use path::{resolve, split_path};
pub use persist::{FileStorage, MemoryStorage, Persistence, Storage, Unavailable};
pub use snapshot::{strip_store, NodeState, PersistedState, Snapshot, StoreState};
pub use store::StateStore;
pub use stream::{Emitter, EventStream, Listener, Subscription, Watch};
pub use util::{deep_merge, Target};
