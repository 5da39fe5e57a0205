#![forbid(unsafe_code)]

//! Error types for the column layout engine.
//!
//! Every error here is local and recoverable: a rejected operation leaves the
//! table's layout state exactly as it was.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::ColumnId;

/// Why a column was rejected for the requested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidColumnReason {
    /// The id is not part of the table's registry.
    Unknown,
    /// The column exists but is currently hidden.
    NotVisible,
    /// The column is configured as not independently resizable.
    NotResizable,
    /// The column is the rightmost visible column; there is no boundary
    /// neighbour to trade width with.
    NoNeighbor,
    /// Mandatory columns can never be hidden.
    Mandatory,
    /// No container width has been measured yet.
    NotMeasured,
    /// Hiding it would leave the table without visible columns.
    LastVisible,
}

impl fmt::Display for InvalidColumnReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unknown => "unknown column",
            Self::NotVisible => "column is not visible",
            Self::NotResizable => "column is not resizable",
            Self::NoNeighbor => "column has no right neighbour",
            Self::Mandatory => "column is mandatory",
            Self::NotMeasured => "table has not been measured",
            Self::LastVisible => "column is the last visible column",
        };
        f.write_str(text)
    }
}

/// Why a reorder request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReorderReason {
    /// The moved column (or the drop target) is not visible.
    NotVisible,
    /// Target index is past the end of the visible order.
    OutOfRange { index: usize, len: usize },
    /// A mandatory column would leave the pinned prefix.
    MandatoryOutsidePrefix { prefix_len: usize },
    /// A regular column would be dropped inside the pinned prefix.
    IntoPinnedPrefix { prefix_len: usize },
}

impl fmt::Display for InvalidReorderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotVisible => f.write_str("column is not visible"),
            Self::OutOfRange { index, len } => {
                write!(f, "target index {index} out of range for {len} visible columns")
            }
            Self::MandatoryOutsidePrefix { prefix_len } => {
                write!(f, "mandatory column must stay within the first {prefix_len} slots")
            }
            Self::IntoPinnedPrefix { prefix_len } => {
                write!(f, "slots 0..{prefix_len} are pinned to mandatory columns")
            }
        }
    }
}

/// Errors from table layout operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("invalid column `{column}`: {reason}")]
    InvalidColumn {
        column: ColumnId,
        reason: InvalidColumnReason,
    },

    #[error("invalid reorder of `{column}`: {reason}")]
    InvalidReorder {
        column: ColumnId,
        reason: InvalidReorderReason,
    },

    #[error("no resize gesture is in progress")]
    NoActiveResize,

    #[error("a resize gesture on `{column}` is in progress")]
    ResizeInProgress { column: ColumnId },
}

impl LayoutError {
    pub(crate) fn invalid_column(column: &ColumnId, reason: InvalidColumnReason) -> Self {
        Self::InvalidColumn {
            column: column.clone(),
            reason,
        }
    }

    pub(crate) fn invalid_reorder(column: &ColumnId, reason: InvalidReorderReason) -> Self {
        Self::InvalidReorder {
            column: column.clone(),
            reason,
        }
    }

    /// Stable short name used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidColumn { .. } => "invalid_column",
            Self::InvalidReorder { .. } => "invalid_reorder",
            Self::NoActiveResize => "no_active_resize",
            Self::ResizeInProgress { .. } => "resize_in_progress",
        }
    }
}

/// Errors raised while building a [`crate::ColumnRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a table needs at least one column")]
    Empty,

    #[error("column id must not be empty")]
    EmptyId,

    #[error("duplicate column id `{0}`")]
    DuplicateId(ColumnId),

    #[error("column `{0}` must have a minimum width greater than zero")]
    ZeroMinWidth(ColumnId),

    #[error("column `{column}` prefers {preferred}px which is below its {min}px minimum")]
    PreferredBelowMin {
        column: ColumnId,
        min: u32,
        preferred: u32,
    },
}

/// Errors from a preference store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid table key `{0}`")]
    InvalidKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors while loading a [`crate::TableConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
