//! Synchronization settings.
//!
//! Settings are resolved once per registration with the precedence
//! call-site ([`UpsertOptions`]) > injected defaults ([`SyncConfig`] given
//! to the manager) > built-in defaults ([`SyncConfig::default`]).

use crate::control::ArrayFactory;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "formsync";

/// Process-wide synchronization defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a burst of control changes is written.
    /// Default: 0 (write on every change)
    #[serde(rename = "debounce_ms", with = "millis")]
    pub debounce_time: Duration,

    /// Mirror snapshots into durable storage.
    /// Default: false
    pub persist_state: bool,

    /// Capture the control's value on first registration.
    /// Default: false
    pub with_initial_value: bool,

    /// Key of the persisted blob.
    pub storage_key: String,

    /// Creates array elements when re-hydrating longer stored arrays.
    #[serde(skip)]
    pub array_factory: Option<ArrayFactory>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_time: Duration::ZERO,
            persist_state: false,
            with_initial_value: false,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            array_factory: None,
        }
    }
}

impl SyncConfig {
    /// Parse from JSON. Missing fields take their built-in defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: SyncConfig =
            serde_json::from_str(raw).map_err(|e| SyncError::Config(e.to_string()))?;
        if config.storage_key.is_empty() {
            return Err(SyncError::Config("storage_key must not be empty".into()));
        }
        Ok(config)
    }

    /// These defaults with `options` applied on top.
    pub fn resolve(&self, options: &UpsertOptions) -> SyncConfig {
        SyncConfig {
            debounce_time: options.debounce_time.unwrap_or(self.debounce_time),
            persist_state: options.persist_state.unwrap_or(self.persist_state),
            with_initial_value: options.with_initial_value.unwrap_or(self.with_initial_value),
            storage_key: options
                .storage_key
                .clone()
                .unwrap_or_else(|| self.storage_key.clone()),
            array_factory: options
                .array_factory
                .clone()
                .or_else(|| self.array_factory.clone()),
        }
    }
}

/// Per-registration overrides; unset fields fall back to the defaults.
#[derive(Clone, Debug, Default)]
pub struct UpsertOptions {
    pub debounce_time: Option<Duration>,
    pub persist_state: Option<bool>,
    pub with_initial_value: Option<bool>,
    pub storage_key: Option<String>,
    pub array_factory: Option<ArrayFactory>,
}

impl UpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debounce(mut self, period: Duration) -> Self {
        self.debounce_time = Some(period);
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist_state = Some(persist);
        self
    }

    pub fn with_initial_value(mut self, capture: bool) -> Self {
        self.with_initial_value = Some(capture);
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn array_factory(mut self, factory: ArrayFactory) -> Self {
        self.array_factory = Some(factory);
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce_time, Duration::ZERO);
        assert!(!config.persist_state);
        assert!(!config.with_initial_value);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert!(config.array_factory.is_none());
    }

    #[test]
    fn test_call_site_wins() {
        let injected = SyncConfig {
            debounce_time: Duration::from_millis(300),
            persist_state: true,
            storage_key: "app".into(),
            ..Default::default()
        };

        let resolved = injected.resolve(
            &UpsertOptions::new()
                .persist(false)
                .with_initial_value(true),
        );
        assert_eq!(resolved.debounce_time, Duration::from_millis(300));
        assert!(!resolved.persist_state);
        assert!(resolved.with_initial_value);
        assert_eq!(resolved.storage_key, "app");

        let resolved = injected.resolve(&UpsertOptions::new().storage_key("other"));
        assert_eq!(resolved.storage_key, "other");
        assert!(resolved.persist_state);
    }

    #[test]
    fn test_from_json() {
        let config =
            SyncConfig::from_json(r#"{"debounce_ms": 250, "persist_state": true}"#).unwrap();
        assert_eq!(config.debounce_time, Duration::from_millis(250));
        assert!(config.persist_state);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);

        assert!(matches!(
            SyncConfig::from_json(r#"{"debounce_ms": "soon"}"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::from_json(r#"{"storage_key": ""}"#),
            Err(SyncError::Config(_))
        ));
    }
}
