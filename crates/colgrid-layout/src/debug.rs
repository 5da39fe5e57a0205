#![forbid(unsafe_code)]

//! Layout state instrumentation.
//!
//! [`Instrumentation`] captures [`DebugSnapshot`]s of a table's layout state at
//! each transition. It is resolved once per table from
//! [`DebugConfig`](crate::DebugConfig): when disabled it holds nothing, and
//! [`Instrumentation::record_with`] never calls its factory, so production
//! tables pay one branch per transition.
//!
//! Snapshots are observational only. Nothing recorded here is ever read back
//! into layout state.
//!
//! # Usage
//!
//! ```
//! use colgrid_layout::debug::{DebugSnapshot, Instrumentation, MemorySink};
//!
//! let sink = MemorySink::new();
//! let mut debug = Instrumentation::enabled(8).with_sink(Box::new(sink.clone()));
//! debug.record_with(|| DebugSnapshot::new("resize_start"));
//! assert_eq!(debug.flush(), 1);
//! assert_eq!(sink.snapshots()[0].event, "resize_start");
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::{Instant, SystemTime, UNIX_EPOCH};

use crate::ColumnId;
use crate::config::DebugConfig;
use crate::sizing::ColumnPreferences;

/// Point-in-time copy of a table's layout state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    /// Transition name, e.g. `resize_commit`.
    pub event: Cow<'static, str>,
    /// Wall clock, milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Visible columns in display order.
    pub column_ids: Vec<ColumnId>,
    pub container_width: Option<u32>,
    pub computed_widths: BTreeMap<ColumnId, u32>,
    pub preferences: ColumnPreferences,
    pub min_sizes: BTreeMap<ColumnId, u32>,
    pub preferred_sizes: BTreeMap<ColumnId, u32>,
    pub is_resizing: bool,
    pub is_initialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DebugSnapshot {
    pub fn new(event: impl Into<Cow<'static, str>>) -> Self {
        Self {
            event: event.into(),
            timestamp_ms: now_ms(),
            ..Self::default()
        }
    }

    /// Attach serializable context. A serialization failure is kept in
    /// `error` instead of failing the caller.
    #[must_use]
    pub fn with_context<T: Serialize + ?Sized>(mut self, context: &T) -> Self {
        match serde_json::to_value(context) {
            Ok(value) => self.context = Some(value),
            Err(err) => self.error = Some(format!("context: {err}")),
        }
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sum of computed widths.
    #[must_use]
    pub fn total_width(&self) -> u64 {
        self.computed_widths.values().map(|&w| u64::from(w)).sum()
    }

    /// Columns are wider than the container (horizontal scroll).
    #[must_use]
    pub fn has_overflow(&self) -> bool {
        self.container_width
            .is_some_and(|w| self.total_width() > u64::from(w))
    }

    /// A column is below its registered minimum.
    #[must_use]
    pub fn has_min_violation(&self) -> bool {
        self.computed_widths
            .iter()
            .any(|(id, &w)| self.min_sizes.get(id).is_some_and(|&min| w < min))
    }

    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "{} @ {}ms:", self.event, self.timestamp_ms);
        match self.container_width {
            Some(w) => {
                let _ = writeln!(s, "  Container: {w}px, columns: {}px", self.total_width());
            }
            None => {
                let _ = writeln!(s, "  Container: unmeasured");
            }
        }
        for id in &self.column_ids {
            let width = self.computed_widths.get(id).copied().unwrap_or_default();
            let min = self.min_sizes.get(id).copied().unwrap_or_default();
            let marker = if self.preferences.contains_key(id) { " *" } else { "" };
            let _ = writeln!(s, "  {id}: {width}px (min {min}){marker}");
        }
        if self.is_resizing {
            let _ = writeln!(s, "  resizing");
        }
        if self.has_overflow() {
            let _ = writeln!(s, "  OVERFLOW");
        }
        if self.has_min_violation() {
            let _ = writeln!(s, "  MIN VIOLATION");
        }
        if let Some(d) = self.duration {
            let _ = writeln!(s, "  Took: {d:?}");
        }
        if let Some(err) = &self.error {
            let _ = writeln!(s, "  Error: {err}");
        }
        s
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Destination for flushed snapshots.
pub trait DebugSink: Send {
    fn emit(&mut self, snapshot: &DebugSnapshot);
}

/// Emits each snapshot as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn emit(&mut self, snapshot: &DebugSnapshot) {
        let json = serde_json::to_string(snapshot).unwrap_or_default();
        tracing::debug!(
            target: "colgrid::debug",
            event = %snapshot.event,
            overflow = snapshot.has_overflow(),
            resizing = snapshot.is_resizing,
            snapshot = %json,
            "layout snapshot"
        );
    }
}

/// Collects snapshots in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    snapshots: Arc<Mutex<Vec<DebugSnapshot>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<DebugSnapshot> {
        self.snapshots
            .lock()
            .ok()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<String> {
        self.snapshots()
            .into_iter()
            .map(|s| s.event.into_owned())
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.clear();
        }
    }
}

impl DebugSink for MemorySink {
    fn emit(&mut self, snapshot: &DebugSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot.clone());
        }
    }
}

struct Recorder {
    buffer: VecDeque<DebugSnapshot>,
    capacity: usize,
    dropped: u64,
    sink: Option<Box<dyn DebugSink>>,
}

/// Snapshot recorder; inert when disabled.
#[derive(Default)]
pub struct Instrumentation {
    recorder: Option<Recorder>,
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.recorder {
            None => f.write_str("Instrumentation(disabled)"),
            Some(r) => f
                .debug_struct("Instrumentation")
                .field("buffered", &r.buffer.len())
                .field("capacity", &r.capacity)
                .field("dropped", &r.dropped)
                .field("has_sink", &r.sink.is_some())
                .finish(),
        }
    }
}

impl Instrumentation {
    #[must_use]
    pub const fn disabled() -> Self {
        Self { recorder: None }
    }

    /// Record into a ring buffer of `capacity` snapshots (at least one).
    #[must_use]
    pub fn enabled(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recorder: Some(Recorder {
                buffer: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                dropped: 0,
                sink: None,
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &DebugConfig) -> Self {
        if config.enabled {
            Self::enabled(config.capacity)
        } else {
            Self::disabled()
        }
    }

    /// Route flushed snapshots to `sink`. No effect when disabled.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.set_sink(sink);
        self
    }

    pub fn set_sink(&mut self, sink: Box<dyn DebugSink>) {
        if let Some(recorder) = &mut self.recorder {
            recorder.sink = Some(sink);
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.recorder.is_some()
    }

    /// Record the snapshot built by `make`, which only runs when enabled.
    #[inline]
    pub fn record_with(&mut self, make: impl FnOnce() -> DebugSnapshot) {
        if let Some(recorder) = &mut self.recorder {
            recorder.push(make());
        }
    }

    pub fn record_snapshot(&mut self, snapshot: DebugSnapshot) {
        if let Some(recorder) = &mut self.recorder {
            recorder.push(snapshot);
        }
    }

    /// Run `op`, recording its elapsed time as a `label` snapshot.
    ///
    /// The result of `op` is returned unchanged whether or not recording is
    /// enabled.
    pub fn measure_timing<T>(&mut self, label: &'static str, op: impl FnOnce() -> T) -> T {
        self.measure_timing_with(op, |_| DebugSnapshot::new(label))
    }

    /// Run `op` and record its elapsed time on the snapshot `make` builds
    /// from the result, so the timing carries the state it produced. `make`
    /// only runs when enabled.
    pub fn measure_timing_with<T>(
        &mut self,
        op: impl FnOnce() -> T,
        make: impl FnOnce(&T) -> DebugSnapshot,
    ) -> T {
        let Some(recorder) = &mut self.recorder else {
            return op();
        };
        let start = Instant::now();
        let out = op();
        let elapsed = start.elapsed();
        recorder.push(make(&out).with_duration(elapsed));
        out
    }

    /// Drain buffered snapshots into the sink. Returns how many were emitted;
    /// without a sink the buffer is kept.
    pub fn flush(&mut self) -> usize {
        let Some(recorder) = &mut self.recorder else {
            return 0;
        };
        let Some(sink) = &mut recorder.sink else {
            return 0;
        };
        let count = recorder.buffer.len();
        for snapshot in recorder.buffer.drain(..) {
            sink.emit(&snapshot);
        }
        count
    }

    /// Take all buffered snapshots.
    pub fn drain(&mut self) -> Vec<DebugSnapshot> {
        self.recorder
            .as_mut()
            .map(|r| r.buffer.drain(..).collect())
            .unwrap_or_default()
    }

    /// Copy of the buffered snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<DebugSnapshot> {
        self.recorder
            .as_ref()
            .map(|r| r.buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recorder.as_ref().map_or(0, |r| r.buffer.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots evicted because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.recorder.as_ref().map_or(0, |r| r.dropped)
    }

    pub fn clear(&mut self) {
        if let Some(recorder) = &mut self.recorder {
            recorder.buffer.clear();
            recorder.dropped = 0;
        }
    }

    /// Human-readable summary of the buffered snapshots.
    #[must_use]
    pub fn report(&self) -> String {
        let Some(recorder) = &self.recorder else {
            return "=== Column Layout Debug Report (disabled) ===\n".to_owned();
        };
        let mut s = String::new();
        let _ = writeln!(
            s,
            "=== Column Layout Debug Report ({} snapshots, {} dropped) ===",
            recorder.buffer.len(),
            recorder.dropped
        );

        let overflows: Vec<_> = recorder.buffer.iter().filter(|r| r.has_overflow()).collect();
        if !overflows.is_empty() {
            let _ = writeln!(s, "\n{} snapshots have OVERFLOW:", overflows.len());
            for r in &overflows {
                let _ = writeln!(s, "  - {} @ {}ms", r.event, r.timestamp_ms);
            }
        }
        let errors: Vec<_> = recorder.buffer.iter().filter(|r| r.error.is_some()).collect();
        if !errors.is_empty() {
            let _ = writeln!(s, "\n{} snapshots have errors:", errors.len());
            for r in &errors {
                let _ = writeln!(s, "  - {}: {}", r.event, r.error.as_deref().unwrap_or_default());
            }
        }

        for snapshot in &recorder.buffer {
            let _ = write!(s, "\n{}", snapshot.summary());
        }
        s
    }
}

impl Recorder {
    fn push(&mut self, snapshot: DebugSnapshot) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn sized(event: &'static str, container: u32, widths: &[(&str, u32, u32)]) -> DebugSnapshot {
        let mut snap = DebugSnapshot::new(event);
        snap.container_width = Some(container);
        for &(id, w, min) in widths {
            snap.column_ids.push(ColumnId::from(id));
            snap.computed_widths.insert(ColumnId::from(id), w);
            snap.min_sizes.insert(ColumnId::from(id), min);
        }
        snap
    }

    #[test]
    fn disabled_never_calls_factory() {
        let mut debug = Instrumentation::disabled();
        let mut called = false;
        debug.record_with(|| {
            called = true;
            DebugSnapshot::new("x")
        });
        assert!(!called);
        assert!(debug.is_empty());
        assert_eq!(debug.flush(), 0);
    }

    #[test]
    fn from_config_respects_flag() {
        assert!(!Instrumentation::from_config(&DebugConfig::default()).is_enabled());
        let config = DebugConfig {
            enabled: true,
            capacity: 4,
        };
        assert!(Instrumentation::from_config(&config).is_enabled());
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut debug = Instrumentation::enabled(2);
        for event in ["a", "b", "c"] {
            debug.record_snapshot(DebugSnapshot::new(event));
        }
        let events: Vec<_> = debug.snapshots().into_iter().map(|s| s.event).collect();
        assert_eq!(events, ["b", "c"]);
        assert_eq!(debug.dropped(), 1);
    }

    #[test]
    fn flush_drains_into_sink() {
        let sink = MemorySink::new();
        let mut debug = Instrumentation::enabled(8).with_sink(Box::new(sink.clone()));
        debug.record_snapshot(DebugSnapshot::new("a"));
        debug.record_snapshot(DebugSnapshot::new("b"));
        assert_eq!(debug.flush(), 2);
        assert!(debug.is_empty());
        assert_eq!(sink.events(), ["a", "b"]);
    }

    #[test]
    fn flush_without_sink_keeps_buffer() {
        let mut debug = Instrumentation::enabled(8);
        debug.record_snapshot(DebugSnapshot::new("a"));
        assert_eq!(debug.flush(), 0);
        assert_eq!(debug.drain().len(), 1);
        assert!(debug.is_empty());
    }

    #[test]
    fn measure_timing_returns_result() {
        let mut off = Instrumentation::disabled();
        assert_eq!(off.measure_timing("compute", || 7), 7);

        let mut on = Instrumentation::enabled(4);
        assert_eq!(on.measure_timing("compute", || "ok"), "ok");
        let snap = &on.snapshots()[0];
        assert_eq!(snap.event, "compute");
        assert!(snap.duration.is_some());
    }

    #[test]
    fn measure_timing_with_builds_snapshot_from_result() {
        let mut off = Instrumentation::disabled();
        let out = off.measure_timing_with(|| 3u32, |_| unreachable!("disabled"));
        assert_eq!(out, 3);

        let mut on = Instrumentation::enabled(4);
        let out = on.measure_timing_with(
            || 640u32,
            |&width| sized("compute", 640, &[("x", width, 10)]),
        );
        assert_eq!(out, 640);
        let snap = &on.snapshots()[0];
        assert_eq!(snap.computed_widths["x"], 640);
        assert_eq!(snap.container_width, Some(640));
        assert!(snap.duration.is_some());
    }

    #[test]
    fn unserializable_context_is_recorded_as_error() {
        let mut bad = HashMap::new();
        bad.insert((1u8, 2u8), 3u8);
        let snap = DebugSnapshot::new("x").with_context(&bad);
        assert!(snap.context.is_none());
        assert!(snap.error.as_deref().is_some_and(|e| e.starts_with("context:")));

        let ok = DebugSnapshot::new("x").with_context(&serde_json::json!({"delta": 5}));
        assert_eq!(ok.context, Some(serde_json::json!({"delta": 5})));
    }

    #[test]
    fn overflow_and_min_flags() {
        let fits = sized("a", 200, &[("x", 100, 50), ("y", 100, 50)]);
        assert!(!fits.has_overflow());
        let over = sized("b", 100, &[("x", 80, 80), ("y", 60, 60)]);
        assert!(over.has_overflow());
        let squeezed = sized("c", 100, &[("x", 40, 50), ("y", 60, 50)]);
        assert!(squeezed.has_min_violation());
    }

    #[test]
    fn report_lists_overflows() {
        let mut debug = Instrumentation::enabled(8);
        debug.record_snapshot(sized("set_container_width", 100, &[("x", 80, 80), ("y", 60, 60)]));
        let report = debug.report();
        assert!(report.contains("1 snapshots, 0 dropped"));
        assert!(report.contains("1 snapshots have OVERFLOW"));
        assert!(report.contains("x: 80px (min 80)"));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(sized("a", 10, &[("x", 10, 5)])).unwrap();
        assert!(json.get("containerWidth").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("isResizing").is_some());
        assert!(json.get("context").is_none());
    }
}
