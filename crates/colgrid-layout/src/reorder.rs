#![forbid(unsafe_code)]

//! Drag-and-drop column reordering with a pinned mandatory prefix.
//!
//! Visible order always starts with the mandatory columns. A move is only
//! accepted if it keeps that prefix intact: mandatory columns may shuffle
//! among themselves, every other column moves within the remaining slots.

use serde::{Deserialize, Serialize};

use crate::ColumnId;
use crate::error::{InvalidReorderReason, LayoutError};
use crate::registry::ColumnRegistry;

/// Gesture end reported by the drag source. `over_id` is `None` when the
/// column was dropped outside the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragEnd {
    pub active_id: ColumnId,
    pub over_id: Option<ColumnId>,
}

impl DragEnd {
    pub fn new(active_id: impl Into<ColumnId>, over_id: impl Into<ColumnId>) -> Self {
        Self {
            active_id: active_id.into(),
            over_id: Some(over_id.into()),
        }
    }
}

/// Stateless reorder rules over a table's column orders.
#[derive(Debug, Clone, Copy)]
pub struct ReorderController<'a> {
    registry: &'a ColumnRegistry,
}

impl<'a> ReorderController<'a> {
    #[must_use]
    pub const fn new(registry: &'a ColumnRegistry) -> Self {
        Self { registry }
    }

    /// Length of the mandatory prefix of `visible`.
    #[must_use]
    pub fn pinned_prefix_len(&self, visible: &[ColumnId]) -> usize {
        visible
            .iter()
            .take_while(|id| self.registry.is_mandatory(id.as_str()))
            .count()
    }

    /// Move `moved` so it ends up at `target` in the visible order.
    pub fn reorder(
        &self,
        visible: &[ColumnId],
        moved: &str,
        target: usize,
    ) -> Result<Vec<ColumnId>, LayoutError> {
        let moved_id = ColumnId::from(moved);
        let Some(from) = visible.iter().position(|id| id == moved) else {
            let reason = InvalidReorderReason::NotVisible;
            return Err(LayoutError::invalid_reorder(&moved_id, reason));
        };
        if target >= visible.len() {
            let reason = InvalidReorderReason::OutOfRange {
                index: target,
                len: visible.len(),
            };
            return Err(LayoutError::invalid_reorder(&moved_id, reason));
        }

        let prefix_len = self.pinned_prefix_len(visible);
        if self.registry.is_mandatory(moved) {
            if target >= prefix_len {
                let reason = InvalidReorderReason::MandatoryOutsidePrefix { prefix_len };
                return Err(LayoutError::invalid_reorder(&moved_id, reason));
            }
        } else if target < prefix_len {
            let reason = InvalidReorderReason::IntoPinnedPrefix { prefix_len };
            return Err(LayoutError::invalid_reorder(&moved_id, reason));
        }

        let mut next = visible.to_vec();
        let column = next.remove(from);
        next.insert(target, column);
        Ok(next)
    }

    /// Map a drag end to `(moved, target)`. `None` means nothing to do.
    pub fn resolve_drag_end(
        &self,
        visible: &[ColumnId],
        drag: &DragEnd,
    ) -> Result<Option<(ColumnId, usize)>, LayoutError> {
        let Some(over) = &drag.over_id else {
            return Ok(None);
        };
        if *over == drag.active_id {
            return Ok(None);
        }
        let Some(target) = visible.iter().position(|id| id == over) else {
            let reason = InvalidReorderReason::NotVisible;
            return Err(LayoutError::invalid_reorder(over, reason));
        };
        Ok(Some((drag.active_id.clone(), target)))
    }

    /// Write a new visible sequence back into the full order. Hidden columns
    /// keep their slots; visible slots are refilled in the new sequence.
    #[must_use]
    pub fn rebuild_full_order(full: &[ColumnId], visible: &[ColumnId]) -> Vec<ColumnId> {
        let mut next_visible = visible.iter();
        full.iter()
            .map(|id| {
                if visible.contains(id) {
                    next_visible.next().unwrap_or(id).clone()
                } else {
                    id.clone()
                }
            })
            .collect()
    }
}
