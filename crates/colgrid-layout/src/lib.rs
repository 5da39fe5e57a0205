#![forbid(unsafe_code)]

//! Adaptive column layout for data tables.
//!
//! A table owns one [`TableLayout`], which keeps the [`LayoutState`] (visible
//! order and computed pixel widths) in sync with:
//!
//! - container width changes pushed by the host,
//! - column boundary drags ([`ResizeController`]),
//! - drag-and-drop reorders ([`ReorderController`]),
//! - visibility, sort and reset actions,
//!
//! and round-trips user preferences through a [`PreferenceStore`] with
//! debounced writes. Widths come from the pure [`sizing::compute`] solver.
//! State transitions can be captured by [`debug::Instrumentation`], which is
//! inert unless enabled in [`TableConfig`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use colgrid_layout::{Column, ColumnRegistry, MemoryPreferenceStore, TableConfig, TableLayout};
//!
//! let registry = ColumnRegistry::new([
//!     Column::new("a", 80, 120),
//!     Column::new("b", 100, 100),
//!     Column::fixed("c", 60, 60),
//! ])
//! .unwrap();
//! let store = Arc::new(MemoryPreferenceStore::new());
//! let mut table = TableLayout::mount(TableConfig::new("pools"), registry, store);
//!
//! table.set_container_width(800);
//! assert_eq!(table.width_of("c"), Some(60));
//! assert_eq!(table.state().computed_widths().total(), 800);
//! ```

pub mod config;
pub mod debug;
pub mod error;
pub mod prefs;
pub mod registry;
pub mod reorder;
pub mod resize;
pub mod sizing;
pub mod table;

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use config::{DebugConfig, PersistConfig, TableConfig};
pub use debug::{DebugSink, DebugSnapshot, Instrumentation, MemorySink, TracingSink};
pub use error::{
    ConfigError, InvalidColumnReason, InvalidReorderReason, LayoutError, RegistryError,
    StoreError, StoreResult,
};
pub use prefs::{
    JsonFilePreferenceStore, MemoryPreferenceStore, PersistDebouncer, PreferenceStore,
    Preferences, SortDirection, SortSpec,
};
pub use registry::{Column, ColumnMode, ColumnRegistry};
pub use reorder::{DragEnd, ReorderController};
pub use resize::{
    ResizeController, ResizePhase, ResizeSession, ResizeTransition, ResizeTransitionKind,
};
pub use sizing::{ActiveResize, ColumnPreference, ColumnPreferences, ColumnWidths, compute};
pub use table::{LayoutState, TableLayout};

/// Opaque, stable column identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(String);

impl ColumnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ColumnId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ColumnId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&ColumnId> for ColumnId {
    fn from(id: &ColumnId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for ColumnId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ColumnId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ColumnId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ColumnId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
