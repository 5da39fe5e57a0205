#![forbid(unsafe_code)]

//! Persisted table preferences and the stores that hold them.
//!
//! # Record Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "visibleColumns": ["name", "status"],
//!   "order": ["name", "status", "age"],
//!   "perColumn": { "status": { "mode": "fixed", "width": 140 } },
//!   "sort": { "column": "status", "direction": "desc" }
//! }
//! ```
//!
//! Decoding is lenient: unknown keys are ignored, a key with the wrong shape
//! falls back to its default, and [`Preferences::normalized`] reconciles the
//! record with the current column registry. A stale record never fails a
//! mount.
//!
//! # Writes
//!
//! [`PersistDebouncer`] coalesces mutations so a burst of edits produces one
//! save. [`JsonFilePreferenceStore`] writes to a temp file and renames it into
//! place.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use web_time::Instant;

use crate::ColumnId;
use crate::error::{StoreError, StoreResult};
use crate::registry::ColumnRegistry;
use crate::sizing::{ColumnPreference, ColumnPreferences};

/// Current record version.
pub const PREFERENCES_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: ColumnId,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: impl Into<ColumnId>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// The durable per-table preference record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_columns: Option<Vec<ColumnId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<ColumnId>>,
    #[serde(skip_serializing_if = "ColumnPreferences::is_empty")]
    pub per_column: ColumnPreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            visible_columns: None,
            order: None,
            per_column: ColumnPreferences::new(),
            sort: None,
        }
    }
}

impl Preferences {
    /// Decode a stored record, tolerating stale or partially corrupt shapes.
    ///
    /// Only input that is not a JSON object at all is an error.
    pub fn from_json_lenient(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(mut fields) = value else {
            return Err(serde::de::Error::custom("preferences record is not an object"));
        };

        let mut prefs = Self::default();
        if let Some(version) = fields.remove("version").and_then(|v| v.as_u64()) {
            prefs.version = u32::try_from(version).unwrap_or(PREFERENCES_VERSION);
        }
        prefs.visible_columns = fields
            .remove("visibleColumns")
            .and_then(|v| lenient_field("visibleColumns", v));
        prefs.order = fields
            .remove("order")
            .and_then(|v| lenient_field("order", v));
        prefs.sort = fields.remove("sort").and_then(|v| lenient_field("sort", v));
        if let Some(Value::Object(entries)) = fields.remove("perColumn") {
            for (id, entry) in entries {
                if let Some(pref) = lenient_field::<ColumnPreference>("perColumn", entry) {
                    prefs.per_column.insert(ColumnId::from(id), pref);
                }
            }
        }
        Ok(prefs)
    }

    /// Reconcile the record with `registry`.
    ///
    /// The result always carries a full `order` (every registered column,
    /// mandatory columns first) and an explicit `visible_columns` list in that
    /// order. Unknown ids are dropped, duplicates removed, widths clamped to
    /// the column minimum, and a sort on an unknown column discarded. A
    /// visible list that repairs to nothing falls back to the registry
    /// defaults.
    #[must_use]
    pub fn normalized(&self, registry: &ColumnRegistry) -> Self {
        let mut seen = BTreeSet::new();
        let mut order: Vec<ColumnId> = self
            .order
            .iter()
            .flatten()
            .filter(|id| registry.contains(id.as_str()) && seen.insert((*id).clone()))
            .cloned()
            .collect();
        for id in registry.ids() {
            if seen.insert(id.clone()) {
                order.push(id.clone());
            }
        }
        let (mut pinned, rest): (Vec<ColumnId>, Vec<ColumnId>) = order
            .into_iter()
            .partition(|id| registry.is_mandatory(id.as_str()));
        pinned.extend(rest);
        let order = pinned;

        let mut visible: BTreeSet<&str> = match &self.visible_columns {
            Some(ids) => ids
                .iter()
                .map(ColumnId::as_str)
                .filter(|id| registry.contains(id))
                .chain(registry.mandatory_ids().map(ColumnId::as_str))
                .collect(),
            None => default_visible(registry),
        };
        // A table always shows at least one column.
        if visible.is_empty() {
            visible = default_visible(registry);
        }
        if visible.is_empty()
            && let Some(first) = order.first()
        {
            visible.insert(first.as_str());
        }
        let visible_columns: Vec<ColumnId> = order
            .iter()
            .filter(|id| visible.contains(id.as_str()))
            .cloned()
            .collect();

        let per_column = self
            .per_column
            .iter()
            .filter(|(_, pref)| !pref.is_empty())
            .filter_map(|(id, pref)| {
                let column = registry.get(id.as_str())?;
                let width = pref.width.map(|w| w.max(column.min_width()));
                Some((
                    id.clone(),
                    ColumnPreference {
                        mode: pref.mode,
                        width,
                    },
                ))
            })
            .collect();

        let sort = self
            .sort
            .clone()
            .filter(|s| registry.contains(s.column.as_str()));

        Self {
            version: PREFERENCES_VERSION,
            visible_columns: Some(visible_columns),
            order: Some(order),
            per_column,
            sort,
        }
    }
}

fn default_visible(registry: &ColumnRegistry) -> BTreeSet<&str> {
    registry
        .iter()
        .filter(|c| c.is_default_visible())
        .map(|c| c.id().as_str())
        .collect()
}

fn lenient_field<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::debug!(key, error = %err, "ignoring malformed preference field");
            None
        }
    }
}

/// Durable mapping from table identity to [`Preferences`].
///
/// Implementations are shared between tables and must be usable behind an
/// `Arc`. Failures are reported but never fatal to a table.
pub trait PreferenceStore: Send + Sync {
    fn load(&self, table_key: &str) -> StoreResult<Option<Preferences>>;
    fn save(&self, table_key: &str, preferences: &Preferences) -> StoreResult<()>;
}

/// In-process store holding serialized records, like browser local storage.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    records: Mutex<FxHashMap<String, String>>,
    saves: Mutex<u64>,
}

impl MemoryPreferenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw JSON stored under `table_key`.
    #[must_use]
    pub fn raw(&self, table_key: &str) -> Option<String> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(table_key).cloned())
    }

    /// Store raw JSON, e.g. a record written by an older release.
    pub fn insert_raw(&self, table_key: impl Into<String>, json: impl Into<String>) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(table_key.into(), json.into());
        }
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|n| *n).unwrap_or_default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, table_key: &str) -> StoreResult<Option<Preferences>> {
        match self.raw(table_key) {
            Some(json) => Ok(Some(Preferences::from_json_lenient(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, table_key: &str, preferences: &Preferences) -> StoreResult<()> {
        let json = serde_json::to_string(preferences)?;
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        records.insert(table_key.to_owned(), json);
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

/// One `<table_key>.json` file per table in a directory.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    dir: PathBuf,
}

impl JsonFilePreferenceStore {
    /// The directory must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, table_key: &str) -> StoreResult<PathBuf> {
        let valid = !table_key.is_empty()
            && !table_key.starts_with('.')
            && table_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(table_key.to_owned()));
        }
        Ok(self.dir.join(format!("{table_key}.json")))
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self, table_key: &str) -> StoreResult<Option<Preferences>> {
        let path = self.path_for(table_key)?;
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Some(Preferences::from_json_lenient(&contents)?))
    }

    fn save(&self, table_key: &str, preferences: &Preferences) -> StoreResult<()> {
        let path = self.path_for(table_key)?;
        let json = serde_json::to_string_pretty(preferences)?;

        // Atomic write: temp file then rename
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, json).map_err(|source| StoreError::Io {
            path: temp.clone(),
            source,
        })?;
        std::fs::rename(&temp, &path).map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }
}

/// Trailing-edge debounce for preference writes.
///
/// Mutations only bump a generation counter; the host's clock is consulted in
/// [`poll`](Self::poll), so the debouncer works with any event loop. A save is
/// due `debounce` after the latest mutation seen by `poll`, and never later
/// than `max_wait` after the first unsaved one.
#[derive(Debug, Clone)]
pub struct PersistDebouncer {
    debounce: Duration,
    max_wait: Duration,
    generation: u64,
    seen_generation: u64,
    saved_generation: u64,
    deadline: Option<Instant>,
    first_pending: Option<Instant>,
}

impl PersistDebouncer {
    #[must_use]
    pub fn new(debounce: Duration, max_wait: Duration) -> Self {
        Self {
            debounce,
            max_wait: max_wait.max(debounce),
            generation: 0,
            seen_generation: 0,
            saved_generation: 0,
            deadline: None,
            first_pending: None,
        }
    }

    /// Record a mutation that should eventually be persisted.
    pub fn mark_dirty(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.generation != self.saved_generation
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a save should happen at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.is_dirty() {
            self.deadline = None;
            self.first_pending = None;
            return false;
        }
        if self.generation != self.seen_generation {
            self.seen_generation = self.generation;
            self.first_pending.get_or_insert(now);
            self.deadline = Some(now + self.debounce);
        }
        let (Some(deadline), Some(first)) = (self.deadline, self.first_pending) else {
            return false;
        };
        now >= deadline.min(first + self.max_wait)
    }

    /// A save of `generation` succeeded.
    pub fn mark_saved(&mut self, generation: u64) {
        self.saved_generation = generation;
        if !self.is_dirty() {
            self.deadline = None;
            self.first_pending = None;
        }
    }

    /// A save failed; stay dirty and wait for the next mutation or flush.
    pub fn mark_failed(&mut self) {
        self.deadline = None;
        self.first_pending = None;
    }
}
