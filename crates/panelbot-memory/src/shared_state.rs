//! Shared State Store.
//!
//! A process-wide key/value blackboard.  Perception steps write their results
//! here and the orchestrator reads them back right after the step returns.
//!
//! # Consistency
//!
//! There are no transactions: every [`SharedState::set`] is an independent
//! single-key write.  A writer that updates several keys in sequence can be
//! observed half-way by a concurrent reader.  The orchestrator never races a
//! writer because each state only reads the keys produced by the perception
//! step it just ran to completion.
//!
//! Keys are created on first write and overwritten afterwards; nothing is
//! ever deleted, so values survive from one orchestrator run to the next.
//!
//! # Keys
//!
//! | key            | value                 | meaning                                    |
//! |----------------|-----------------------|--------------------------------------------|
//! | `ee_position`  | [`StateValue::Vector`] | end-effector position, base frame (m)     |
//! | `wrench`       | [`StateValue::Vector`] | best known wrench position (m)            |
//! | `valve`        | [`StateValue::Vector`] | best known valve position (m)             |
//! | `status`       | [`StateValue::Status`] | outcome of the last perception step       |
//! | `wrench_id_px` | [`StateValue::Pixel`]  | chosen wrench in the last analysed frame  |
//! | `wrench_id_m`  | [`StateValue::Vector`] | chosen wrench offset from the end effector|
//! | `valve_id_m`   | [`StateValue::Vector`] | valve offset from the end effector        |
//!
//! # Example
//!
//! ```rust
//! use panelbot_memory::{SharedState, keys};
//! use panelbot_types::{PerceptionStatus, Vec3};
//!
//! let state = SharedState::in_memory();
//! state.set_ee_position(Vec3::new(0.2, 0.0, 0.4)).unwrap();
//! state.set_status(PerceptionStatus::WrenchFound).unwrap();
//!
//! assert_eq!(state.status().unwrap(), PerceptionStatus::WrenchFound);
//! assert!(state.get(keys::VALVE).is_err());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use panelbot_types::{ObjectClass, PanelError, PerceptionStatus, Pixel, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Well-known shared state keys.
pub mod keys {
    pub const EE_POSITION: &str = "ee_position";
    pub const WRENCH: &str = "wrench";
    pub const VALVE: &str = "valve";
    pub const STATUS: &str = "status";
    pub const WRENCH_ID_PX: &str = "wrench_id_px";
    pub const WRENCH_ID_M: &str = "wrench_id_m";
    pub const VALVE_ID_M: &str = "valve_id_m";
}

// ─────────────────────────────────────────────────────────────────────────────
// Values
// ─────────────────────────────────────────────────────────────────────────────

/// A value held under a shared state key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Vector(Vec3),
    Pixel(Pixel),
    Status(PerceptionStatus),
}

impl StateValue {
    fn kind(&self) -> &'static str {
        match self {
            StateValue::Vector(_) => "vector",
            StateValue::Pixel(_) => "pixel",
            StateValue::Status(_) => "status",
        }
    }
}

/// A stored value together with the time of its last write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub value: StateValue,
    pub updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backends
// ─────────────────────────────────────────────────────────────────────────────

/// Storage behind a [`SharedState`].
///
/// Implementations only need single-key atomicity.
pub trait StateBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<StateEntry>, PanelError>;
    fn store(&self, key: &str, entry: StateEntry) -> Result<(), PanelError>;
    /// All entries, ordered by key.
    fn entries(&self) -> Result<BTreeMap<String, StateEntry>, PanelError>;
}

fn poisoned() -> PanelError {
    PanelError::Backend("state lock poisoned".to_string())
}

/// Process-local backend.
#[derive(Default)]
pub struct MemoryBackend {
    map: RwLock<HashMap<String, StateEntry>>,
}

impl StateBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<StateEntry>, PanelError> {
        let map = self.map.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn store(&self, key: &str, entry: StateEntry) -> Result<(), PanelError> {
        let mut map = self.map.write().map_err(|_| poisoned())?;
        map.insert(key.to_string(), entry);
        Ok(())
    }

    fn entries(&self) -> Result<BTreeMap<String, StateEntry>, PanelError> {
        let map = self.map.read().map_err(|_| poisoned())?;
        Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Backend persisting every key to a single JSON document.
///
/// Each read goes back to the file, so writes from other processes sharing
/// the file become visible without any notification mechanism.
pub struct JsonFileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileBackend {
    /// Use `path` as the backing file; it is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, StateEntry>, PanelError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            PanelError::Backend(format!("failed to read {}: {e}", self.path.display()))
        })?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            PanelError::Backend(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    fn write_all(&self, map: &BTreeMap<String, StateEntry>) -> Result<(), PanelError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| PanelError::Backend(format!("failed to create state dir: {e}")))?;
        }
        let raw = serde_json::to_string_pretty(map)
            .map_err(|e| PanelError::Backend(format!("failed to serialize state: {e}")))?;
        // Write-then-rename so readers never see a truncated document.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                PanelError::Backend(format!("failed to write {}: {e}", self.path.display()))
            })
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&self, key: &str) -> Result<Option<StateEntry>, PanelError> {
        Ok(self.read_all()?.remove(key))
    }

    fn store(&self, key: &str, entry: StateEntry) -> Result<(), PanelError> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;
        let mut map = self.read_all()?;
        map.insert(key.to_string(), entry);
        self.write_all(&map)
    }

    fn entries(&self) -> Result<BTreeMap<String, StateEntry>, PanelError> {
        self.read_all()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SharedState
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to the shared key/value store.
///
/// Clones share the same backend; inject one clone into each component.
#[derive(Clone)]
pub struct SharedState {
    backend: Arc<dyn StateBackend>,
}

impl SharedState {
    /// Store backed by process memory.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::default()))
    }

    /// Store backed by the JSON document at `path`.
    pub fn open_file(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(Arc::new(JsonFileBackend::new(path)))
    }

    pub fn with_backend(backend: Arc<dyn StateBackend>) -> Self {
        Self { backend }
    }

    /// Read the value under `key`.
    ///
    /// # Errors
    ///
    /// [`PanelError::MissingKey`] when the key was never written.
    pub fn get(&self, key: &str) -> Result<StateValue, PanelError> {
        self.backend
            .load(key)?
            .map(|entry| entry.value)
            .ok_or_else(|| PanelError::MissingKey(key.to_string()))
    }

    /// Overwrite (or create) `key`.
    pub fn set(&self, key: &str, value: StateValue) -> Result<(), PanelError> {
        debug!(key, ?value, "shared state write");
        self.backend.store(
            key,
            StateEntry {
                value,
                updated_at: Utc::now(),
            },
        )
    }

    /// Every entry currently held, for post-hoc diagnosis.
    pub fn snapshot(&self) -> Result<BTreeMap<String, StateEntry>, PanelError> {
        self.backend.entries()
    }

    // ── Typed accessors ───────────────────────────────────────────────────

    pub fn get_vec3(&self, key: &str) -> Result<Vec3, PanelError> {
        match self.get(key)? {
            StateValue::Vector(v) => Ok(v),
            other => Err(mismatch(key, "vector", &other)),
        }
    }

    pub fn set_vec3(&self, key: &str, value: Vec3) -> Result<(), PanelError> {
        self.set(key, StateValue::Vector(value))
    }

    pub fn get_pixel(&self, key: &str) -> Result<Pixel, PanelError> {
        match self.get(key)? {
            StateValue::Pixel(p) => Ok(p),
            other => Err(mismatch(key, "pixel", &other)),
        }
    }

    pub fn set_pixel(&self, key: &str, value: Pixel) -> Result<(), PanelError> {
        self.set(key, StateValue::Pixel(value))
    }

    /// Status written by the most recently completed perception step.
    pub fn status(&self) -> Result<PerceptionStatus, PanelError> {
        match self.get(keys::STATUS)? {
            StateValue::Status(s) => Ok(s),
            other => Err(mismatch(keys::STATUS, "status", &other)),
        }
    }

    pub fn set_status(&self, status: PerceptionStatus) -> Result<(), PanelError> {
        self.set(keys::STATUS, StateValue::Status(status))
    }

    pub fn ee_position(&self) -> Result<Vec3, PanelError> {
        self.get_vec3(keys::EE_POSITION)
    }

    pub fn set_ee_position(&self, position: Vec3) -> Result<(), PanelError> {
        self.set_vec3(keys::EE_POSITION, position)
    }

    /// Best current position estimate for `class`.
    pub fn target_position(&self, class: ObjectClass) -> Result<Vec3, PanelError> {
        self.get_vec3(target_key(class))
    }

    pub fn set_target_position(&self, class: ObjectClass, position: Vec3) -> Result<(), PanelError> {
        self.set_vec3(target_key(class), position)
    }

    /// Write `value` only when `key` has never been written.
    ///
    /// Returns `true` when the value was written.
    pub fn seed_vec3(&self, key: &str, value: Vec3) -> Result<bool, PanelError> {
        if self.backend.load(key)?.is_some() {
            return Ok(false);
        }
        self.set_vec3(key, value)?;
        Ok(true)
    }
}

/// Shared state key holding the target position of `class`.
pub fn target_key(class: ObjectClass) -> &'static str {
    match class {
        ObjectClass::Wrench => keys::WRENCH,
        ObjectClass::Valve => keys::VALVE,
    }
}

fn mismatch(key: &str, expected: &str, found: &StateValue) -> PanelError {
    debug!(key, expected, found = found.kind(), "shared state type mismatch");
    PanelError::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
