#![forbid(unsafe_code)]

//! Static column definitions for a table instance.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ColumnId;
use crate::error::RegistryError;

/// How a column takes part in width distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMode {
    /// Shares the remaining container width by preferred width.
    #[default]
    Auto,
    /// Holds an explicit width.
    Fixed,
}

/// A column definition. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    id: ColumnId,
    mandatory: bool,
    min_width: u32,
    preferred_width: u32,
    mode: ColumnMode,
    resizable: bool,
    default_visible: bool,
}

impl Column {
    /// A visible, resizable `auto` column.
    pub fn new(id: impl Into<ColumnId>, min_width: u32, preferred_width: u32) -> Self {
        Self {
            id: id.into(),
            mandatory: false,
            min_width,
            preferred_width,
            mode: ColumnMode::Auto,
            resizable: true,
            default_visible: true,
        }
    }

    /// A `fixed` column that prefers exactly `width` pixels.
    pub fn fixed(id: impl Into<ColumnId>, min_width: u32, width: u32) -> Self {
        Self::new(id, min_width, width).mode(ColumnMode::Fixed)
    }

    #[must_use]
    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: ColumnMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Whether the column is shown when no preference says otherwise.
    /// Ignored for mandatory columns.
    #[must_use]
    pub fn default_visible(mut self, visible: bool) -> Self {
        self.default_visible = visible;
        self
    }

    #[must_use]
    pub fn id(&self) -> &ColumnId {
        &self.id
    }

    #[must_use]
    pub const fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    #[must_use]
    pub const fn min_width(&self) -> u32 {
        self.min_width
    }

    #[must_use]
    pub const fn preferred_width(&self) -> u32 {
        self.preferred_width
    }

    #[must_use]
    pub const fn column_mode(&self) -> ColumnMode {
        self.mode
    }

    #[must_use]
    pub const fn is_resizable(&self) -> bool {
        self.resizable
    }

    #[must_use]
    pub const fn is_default_visible(&self) -> bool {
        self.mandatory || self.default_visible
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.id.as_str().is_empty() {
            return Err(RegistryError::EmptyId);
        }
        if self.min_width == 0 {
            return Err(RegistryError::ZeroMinWidth(self.id.clone()));
        }
        if self.preferred_width < self.min_width {
            return Err(RegistryError::PreferredBelowMin {
                column: self.id.clone(),
                min: self.min_width,
                preferred: self.preferred_width,
            });
        }
        Ok(())
    }
}

/// The validated set of columns available to one table.
///
/// Registry order is the default column order.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    columns: Vec<Column>,
    index: FxHashMap<ColumnId, usize>,
}

impl ColumnRegistry {
    /// Validate and index a column set.
    pub fn new(columns: impl IntoIterator<Item = Column>) -> Result<Self, RegistryError> {
        let columns: Vec<Column> = columns.into_iter().collect();
        if columns.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut index = FxHashMap::default();
        index.reserve(columns.len());
        for (i, column) in columns.iter().enumerate() {
            column.validate()?;
            if index.insert(column.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateId(column.id.clone()));
            }
        }
        Ok(Self { columns, index })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Column> {
        self.index.get(id).map(|&i| &self.columns[i])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Position of `id` in registry order.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> + '_ {
        self.columns.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ColumnId> + '_ {
        self.columns.iter().map(Column::id)
    }

    pub fn mandatory_ids(&self) -> impl Iterator<Item = &ColumnId> + '_ {
        self.columns
            .iter()
            .filter(|c| c.is_mandatory())
            .map(Column::id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn is_mandatory(&self, id: &str) -> bool {
        self.get(id).is_some_and(Column::is_mandatory)
    }

    /// Resolve ids to column definitions, skipping unknown ids.
    pub fn resolve<'a>(&'a self, ids: &'a [ColumnId]) -> impl Iterator<Item = &'a Column> + 'a {
        ids.iter().filter_map(|id| self.get(id.as_str()))
    }
}
