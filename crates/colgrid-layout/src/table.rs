#![forbid(unsafe_code)]

//! Per-table layout owner.
//!
//! [`TableLayout`] owns the [`LayoutState`] of one table and is the only thing
//! that mutates it. Hosts push events in (container width, pointer drags,
//! drag-and-drop ends, header menu actions) and read widths back out.
//!
//! Rejected operations return a [`LayoutError`], leave the state untouched,
//! log at `warn` and record an `invalid_operation` snapshot.
//!
//! Preference writes are debounced: mutations mark the table dirty, and the
//! host calls [`TableLayout::poll_persistence`] from its event loop (or
//! [`TableLayout::flush_preferences`] to force a write). Dropping the table
//! force-cancels any drag and flushes.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use web_time::Instant;

use crate::ColumnId;
use crate::config::TableConfig;
use crate::debug::{DebugSink, DebugSnapshot, Instrumentation};
use crate::error::{InvalidColumnReason, LayoutError, StoreResult};
use crate::prefs::{PersistDebouncer, PreferenceStore, Preferences, SortDirection, SortSpec};
use crate::registry::{Column, ColumnRegistry};
use crate::reorder::{DragEnd, ReorderController};
use crate::resize::{ResizeController, ResizeTransition};
use crate::sizing::{self, ColumnPreference, ColumnPreferences, ColumnWidths};

/// Live layout of one table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LayoutState {
    container_width: Option<u32>,
    order: Vec<ColumnId>,
    visible_order: Vec<ColumnId>,
    computed_widths: ColumnWidths,
    is_resizing: bool,
}

impl LayoutState {
    /// Last measured container width; `None` until the first measurement.
    #[must_use]
    pub const fn container_width(&self) -> Option<u32> {
        self.container_width
    }

    /// Every registered column, hidden ones included.
    #[must_use]
    pub fn order(&self) -> &[ColumnId] {
        &self.order
    }

    #[must_use]
    pub fn visible_order(&self) -> &[ColumnId] {
        &self.visible_order
    }

    #[must_use]
    pub const fn computed_widths(&self) -> &ColumnWidths {
        &self.computed_widths
    }

    #[must_use]
    pub const fn is_resizing(&self) -> bool {
        self.is_resizing
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.container_width.is_some()
    }

    #[must_use]
    pub fn is_visible(&self, column: &str) -> bool {
        self.visible_order.iter().any(|id| id == column)
    }

    /// Columns are wider than the container and need horizontal scroll.
    #[must_use]
    pub fn is_overflowing(&self) -> bool {
        self.container_width
            .is_some_and(|w| self.computed_widths.total() > u64::from(w))
    }
}

#[derive(Serialize)]
struct RejectedOperation<'a> {
    operation: &'a str,
    kind: &'a str,
    message: String,
}

pub struct TableLayout {
    config: TableConfig,
    registry: ColumnRegistry,
    store: Arc<dyn PreferenceStore>,
    state: LayoutState,
    per_column: ColumnPreferences,
    sort: Option<SortSpec>,
    resize: ResizeController,
    debouncer: PersistDebouncer,
    debug: Instrumentation,
    disposed: bool,
}

impl TableLayout {
    /// Create the layout for one table, restoring stored preferences.
    ///
    /// A failed or malformed load is logged and the registry defaults are
    /// used instead.
    pub fn mount(
        config: TableConfig,
        registry: ColumnRegistry,
        store: Arc<dyn PreferenceStore>,
    ) -> Self {
        let stored = match store.load(&config.table_key) {
            Ok(Some(prefs)) => prefs,
            Ok(None) => Preferences::default(),
            Err(err) => {
                warn!(
                    table = %config.table_key,
                    error = %err,
                    "failed to load column preferences; using defaults"
                );
                Preferences::default()
            }
        };

        let mut table = Self {
            debouncer: PersistDebouncer::new(
                config.persistence.debounce(),
                config.persistence.max_wait(),
            ),
            debug: Instrumentation::from_config(&config.debug),
            config,
            registry,
            store,
            state: LayoutState::default(),
            per_column: ColumnPreferences::new(),
            sort: None,
            resize: ResizeController::new(),
            disposed: false,
        };
        table.apply_preferences(stored);
        debug!(
            table = %table.config.table_key,
            columns = table.registry.len(),
            visible = table.state.visible_order.len(),
            "mounted column layout"
        );
        table.record("mount");
        table
    }

    #[must_use]
    pub const fn state(&self) -> &LayoutState {
        &self.state
    }

    #[must_use]
    pub const fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &TableConfig {
        &self.config
    }

    #[must_use]
    pub fn width_of(&self, column: &str) -> Option<u32> {
        self.state.computed_widths.get(column)
    }

    #[must_use]
    pub const fn column_preferences(&self) -> &ColumnPreferences {
        &self.per_column
    }

    #[must_use]
    pub const fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    #[must_use]
    pub const fn resize_controller(&self) -> &ResizeController {
        &self.resize
    }

    /// Unsaved preference changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.debouncer.is_dirty()
    }

    /// The record that the next save would write.
    #[must_use]
    pub fn preferences(&self) -> Preferences {
        Preferences {
            version: crate::prefs::PREFERENCES_VERSION,
            visible_columns: Some(self.state.visible_order.clone()),
            order: Some(self.state.order.clone()),
            per_column: self.per_column.clone(),
            sort: self.sort.clone(),
        }
    }

    #[must_use]
    pub const fn instrumentation(&self) -> &Instrumentation {
        &self.debug
    }

    pub fn instrumentation_mut(&mut self) -> &mut Instrumentation {
        &mut self.debug
    }

    /// Route flushed snapshots to `sink`. No effect unless debugging is enabled.
    pub fn set_debug_sink(&mut self, sink: Box<dyn DebugSink>) {
        self.debug.set_sink(sink);
    }

    // --- Container ---------------------------------------------------------

    /// Record a new container width and recompute.
    pub fn set_container_width(&mut self, width: u32) {
        self.state.container_width = Some(width);
        self.recompute();
        debug!(
            table = %self.config.table_key,
            width,
            overflow = self.state.is_overflowing(),
            "container resized"
        );
        self.record("set_container_width");
    }

    // --- Resize ------------------------------------------------------------

    /// Begin dragging the right boundary of `column`.
    pub fn start_resize(&mut self, column: &str, pointer_x: i32) -> Result<(), LayoutError> {
        let transition = self.guarded("start_resize", |t| t.begin_resize(column, pointer_x))?;
        self.recompute();
        self.record_transition(&transition);
        Ok(())
    }

    /// Move the pointer of the live drag. Never marks preferences dirty.
    pub fn update_resize(&mut self, pointer_x: i32) -> Result<(), LayoutError> {
        let transition = self.guarded("update_resize", |t| t.resize.update(pointer_x))?;
        self.recompute();
        self.record_transition(&transition);
        Ok(())
    }

    /// Persist the dragged column's previewed width as a fixed width.
    ///
    /// Only the dragged column (and a fixed neighbour) keep their previewed
    /// widths. A flex neighbour is re-solved with the other flex columns, so
    /// it can shift on release when more than one flex column remains.
    pub fn commit_resize(&mut self) -> Result<(), LayoutError> {
        let (transition, settled) = self.guarded("commit_resize", Self::finish_commit)?;
        self.recompute();
        self.record_transition(&transition);
        if let Some(settled) = settled {
            self.record_transition(&settled);
        }
        Ok(())
    }

    /// Discard the live drag and restore the pre-drag widths.
    pub fn cancel_resize(&mut self) -> Result<(), LayoutError> {
        let (transition, settled) = self.guarded("cancel_resize", |t| {
            let (_, transition) = t.resize.cancel()?;
            let settled = t.resize.settle();
            t.state.is_resizing = false;
            Ok((transition, settled))
        })?;
        self.recompute();
        self.record_transition(&transition);
        if let Some(settled) = settled {
            self.record_transition(&settled);
        }
        Ok(())
    }

    fn begin_resize(
        &mut self,
        column: &str,
        pointer_x: i32,
    ) -> Result<ResizeTransition, LayoutError> {
        self.ensure_idle()?;
        let id = ColumnId::from(column);
        let invalid = |reason| LayoutError::invalid_column(&id, reason);

        let def = self
            .registry
            .get(column)
            .ok_or_else(|| invalid(InvalidColumnReason::Unknown))?;
        let pos = self
            .state
            .visible_order
            .iter()
            .position(|v| v == column)
            .ok_or_else(|| invalid(InvalidColumnReason::NotVisible))?;
        if !def.is_resizable() {
            return Err(invalid(InvalidColumnReason::NotResizable));
        }
        let neighbor = self
            .state
            .visible_order
            .get(pos + 1)
            .cloned()
            .ok_or_else(|| invalid(InvalidColumnReason::NoNeighbor))?;
        if !self.state.is_initialized() {
            return Err(invalid(InvalidColumnReason::NotMeasured));
        }

        let widths = &self.state.computed_widths;
        let start_width = widths.get(column).unwrap_or(def.min_width());
        let neighbor_width = widths.get(neighbor.as_str()).unwrap_or_default();
        let transition = self
            .resize
            .start(id.clone(), neighbor, start_width, neighbor_width, pointer_x)?;
        self.state.is_resizing = true;
        Ok(transition)
    }

    fn finish_commit(
        &mut self,
    ) -> Result<(ResizeTransition, Option<ResizeTransition>), LayoutError> {
        let (session, transition) = self.resize.commit()?;
        let widths = &self.state.computed_widths;
        let width = widths
            .get(session.column.as_str())
            .unwrap_or(session.start_width);
        self.per_column
            .insert(session.column.clone(), ColumnPreference::fixed(width));

        // A fixed neighbour keeps the width it was pushed or pulled to.
        if let Some(neighbor) = self.registry.get(session.neighbor.as_str())
            && sizing::is_fixed(neighbor, self.per_column.get(&session.neighbor))
        {
            let neighbor_width = widths
                .get(session.neighbor.as_str())
                .unwrap_or(session.neighbor_start_width);
            self.per_column
                .entry(session.neighbor.clone())
                .or_default()
                .width = Some(neighbor_width);
        }

        let settled = self.resize.settle();
        self.state.is_resizing = false;
        self.debouncer.mark_dirty();
        Ok((transition, settled))
    }

    // --- Reorder -----------------------------------------------------------

    /// Move `column` to `target` in the visible order and return the new order.
    pub fn reorder(&mut self, column: &str, target: usize) -> Result<Vec<ColumnId>, LayoutError> {
        self.guarded("reorder", |t| t.move_column(column, target))?;
        self.recompute();
        debug!(
            table = %self.config.table_key,
            column,
            target,
            "columns reordered"
        );
        self.record("reorder");
        Ok(self.state.visible_order.clone())
    }

    /// Apply a drag-and-drop end event. Dropping a column on itself or
    /// outside the header does nothing.
    pub fn apply_drag_end(&mut self, drag: &DragEnd) -> Result<(), LayoutError> {
        let resolved = self.guarded("apply_drag_end", |t| {
            t.ensure_idle()?;
            ReorderController::new(&t.registry).resolve_drag_end(&t.state.visible_order, drag)
        })?;
        if let Some((column, target)) = resolved {
            self.reorder(column.as_str(), target)?;
        }
        Ok(())
    }

    fn move_column(&mut self, column: &str, target: usize) -> Result<(), LayoutError> {
        self.ensure_idle()?;
        let visible = ReorderController::new(&self.registry).reorder(
            &self.state.visible_order,
            column,
            target,
        )?;
        if visible != self.state.visible_order {
            self.state.order = ReorderController::rebuild_full_order(&self.state.order, &visible);
            self.state.visible_order = visible;
            self.debouncer.mark_dirty();
        }
        Ok(())
    }

    // --- Visibility --------------------------------------------------------

    /// Show or hide a column. Mandatory columns cannot be hidden.
    pub fn set_column_visible(&mut self, column: &str, visible: bool) -> Result<(), LayoutError> {
        let changed = self.guarded("set_column_visible", |t| t.change_visibility(column, visible))?;
        if changed {
            self.recompute();
            debug!(
                table = %self.config.table_key,
                column,
                visible,
                "column visibility changed"
            );
        }
        self.record("set_column_visible");
        Ok(())
    }

    fn change_visibility(&mut self, column: &str, visible: bool) -> Result<bool, LayoutError> {
        self.ensure_idle()?;
        let id = ColumnId::from(column);
        let def = self
            .registry
            .get(column)
            .ok_or_else(|| LayoutError::invalid_column(&id, InvalidColumnReason::Unknown))?;
        if self.state.is_visible(column) == visible {
            return Ok(false);
        }

        if visible {
            let shown: Vec<ColumnId> = self
                .state
                .order
                .iter()
                .filter(|c| *c == column || self.state.visible_order.contains(*c))
                .cloned()
                .collect();
            self.state.visible_order = shown;
        } else {
            if def.is_mandatory() {
                return Err(LayoutError::invalid_column(&id, InvalidColumnReason::Mandatory));
            }
            if self.state.visible_order.len() == 1 {
                return Err(LayoutError::invalid_column(&id, InvalidColumnReason::LastVisible));
            }
            self.state.visible_order.retain(|c| c != column);
        }
        self.debouncer.mark_dirty();
        Ok(true)
    }

    // --- Sort --------------------------------------------------------------

    /// Replace the sort. Allowed during a drag since widths are unaffected.
    pub fn set_sort(&mut self, sort: Option<SortSpec>) -> Result<(), LayoutError> {
        self.guarded("set_sort", |t| {
            if let Some(spec) = &sort
                && !t.registry.contains(spec.column.as_str())
            {
                return Err(LayoutError::invalid_column(
                    &spec.column,
                    InvalidColumnReason::Unknown,
                ));
            }
            Ok(())
        })?;
        if self.sort != sort {
            self.sort = sort;
            self.debouncer.mark_dirty();
        }
        self.record("set_sort");
        Ok(())
    }

    /// Cycle the sort on `column`: none, ascending, descending, none.
    pub fn toggle_sort(&mut self, column: &str) -> Result<Option<SortDirection>, LayoutError> {
        let next = match &self.sort {
            Some(spec) if spec.column == column => match spec.direction {
                SortDirection::Asc => Some(SortDirection::Desc),
                SortDirection::Desc => None,
            },
            _ => Some(SortDirection::Asc),
        };
        self.set_sort(next.map(|direction| SortSpec::new(column, direction)))?;
        Ok(next)
    }

    // --- Reset -------------------------------------------------------------

    /// Drop the stored width of one column.
    pub fn reset_column(&mut self, column: &str) -> Result<(), LayoutError> {
        self.guarded("reset_column", |t| {
            t.ensure_idle()?;
            if !t.registry.contains(column) {
                let id = ColumnId::from(column);
                return Err(LayoutError::invalid_column(&id, InvalidColumnReason::Unknown));
            }
            if t.per_column.remove(column).is_some() {
                t.debouncer.mark_dirty();
            }
            Ok(())
        })?;
        self.recompute();
        self.record("reset_column");
        Ok(())
    }

    /// Drop every stored width; order, visibility and sort are kept.
    pub fn reset_all_sizes(&mut self) -> Result<(), LayoutError> {
        self.guarded("reset_all_sizes", |t| {
            t.ensure_idle()?;
            if !t.per_column.is_empty() {
                t.per_column.clear();
                t.debouncer.mark_dirty();
            }
            Ok(())
        })?;
        self.recompute();
        self.record("reset_all_sizes");
        Ok(())
    }

    /// Restore registry defaults for widths, order, visibility and sort.
    pub fn reset_preferences(&mut self) -> Result<(), LayoutError> {
        self.guarded("reset_preferences", Self::ensure_idle)?;
        self.apply_preferences(Preferences::default());
        self.debouncer.mark_dirty();
        debug!(table = %self.config.table_key, "column preferences reset");
        self.record("reset_preferences");
        Ok(())
    }

    // --- Persistence -------------------------------------------------------

    /// Save if the debounce window has elapsed at `now`. Returns whether a
    /// save succeeded.
    pub fn poll_persistence(&mut self, now: Instant) -> bool {
        self.debouncer.poll(now) && self.save_now().is_ok()
    }

    /// Save pending changes immediately.
    pub fn flush_preferences(&mut self) -> StoreResult<()> {
        if !self.debouncer.is_dirty() {
            return Ok(());
        }
        self.save_now()
    }

    fn save_now(&mut self) -> StoreResult<()> {
        let generation = self.debouncer.generation();
        let record = self.preferences();
        match self.store.save(&self.config.table_key, &record) {
            Ok(()) => {
                self.debouncer.mark_saved(generation);
                debug!(
                    table = %self.config.table_key,
                    generation,
                    "column preferences saved"
                );
                Ok(())
            }
            Err(err) => {
                self.debouncer.mark_failed();
                warn!(
                    table = %self.config.table_key,
                    error = %err,
                    "failed to save column preferences"
                );
                Err(err)
            }
        }
    }

    // --- Teardown ----------------------------------------------------------

    /// Cancel any live drag and flush pending writes. Idempotent; also runs
    /// on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(transition) = self.resize.force_cancel() {
            self.state.is_resizing = false;
            self.recompute();
            self.record_transition(&transition);
        }
        // Failures are already logged by save_now.
        let _ = self.flush_preferences();
        self.debug.flush();
    }

    // --- Internals ---------------------------------------------------------

    fn apply_preferences(&mut self, prefs: Preferences) {
        let prefs = prefs.normalized(&self.registry);
        self.state.order = prefs.order.unwrap_or_default();
        self.state.visible_order = prefs.visible_columns.unwrap_or_default();
        self.per_column = prefs.per_column;
        self.sort = prefs.sort;
        self.recompute();
    }

    fn recompute(&mut self) {
        let Some(width) = self.state.container_width else {
            return;
        };
        let active = self.resize.active_resize();
        let columns: Vec<&Column> = self.registry.resolve(&self.state.visible_order).collect();
        let (state, registry, per_column) = (&self.state, &self.registry, &self.per_column);
        let widths = self.debug.measure_timing_with(
            || sizing::compute(width, &columns, per_column, active.as_ref()),
            |widths| {
                let mut snap = snapshot("compute", state, registry, per_column);
                snap.computed_widths = widths.to_map();
                snap
            },
        );
        self.state.computed_widths = widths;
    }

    fn ensure_idle(&mut self) -> Result<(), LayoutError> {
        match self.resize.session() {
            Some(session) => Err(LayoutError::ResizeInProgress {
                column: session.column.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Run `op`; on failure log and record it before returning the error.
    fn guarded<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T, LayoutError>,
    ) -> Result<T, LayoutError> {
        op(self).map_err(|err| self.reject(operation, err))
    }

    fn reject(&mut self, operation: &'static str, err: LayoutError) -> LayoutError {
        warn!(
            table = %self.config.table_key,
            operation,
            kind = err.kind(),
            error = %err,
            "layout operation rejected"
        );
        let context = RejectedOperation {
            operation,
            kind: err.kind(),
            message: err.to_string(),
        };
        self.debug.record_with(|| {
            snapshot("invalid_operation", &self.state, &self.registry, &self.per_column)
                .with_context(&context)
        });
        err
    }

    fn record(&mut self, event: &'static str) {
        self.debug
            .record_with(|| snapshot(event, &self.state, &self.registry, &self.per_column));
    }

    fn record_transition(&mut self, transition: &ResizeTransition) {
        debug!(
            table = %self.config.table_key,
            transition = transition.transition_id,
            column = %transition.column,
            delta = transition.accumulated_delta,
            from = ?transition.from,
            to = ?transition.to,
            "{}",
            transition.kind.event_name()
        );
        self.debug.record_with(|| {
            snapshot(
                transition.kind.event_name(),
                &self.state,
                &self.registry,
                &self.per_column,
            )
            .with_context(transition)
        });
    }
}

impl Drop for TableLayout {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn snapshot(
    event: &'static str,
    state: &LayoutState,
    registry: &ColumnRegistry,
    per_column: &ColumnPreferences,
) -> DebugSnapshot {
    let mut snap = DebugSnapshot::new(event);
    snap.column_ids = state.visible_order.clone();
    snap.container_width = state.container_width;
    snap.computed_widths = state.computed_widths.to_map();
    snap.preferences = per_column.clone();
    for column in registry.resolve(&state.visible_order) {
        snap.min_sizes.insert(column.id().clone(), column.min_width());
        snap.preferred_sizes
            .insert(column.id().clone(), column.preferred_width());
    }
    snap.is_resizing = state.is_resizing;
    snap.is_initialized = state.is_initialized();
    snap
}
