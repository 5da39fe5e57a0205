#![forbid(unsafe_code)]

//! Column boundary drag lifecycle.
//!
//! ```text
//! Idle -> Dragging -> Committing -> Idle
//!             \-----> Cancelling -> Idle
//! ```
//!
//! The controller only tracks the gesture. Eligibility checks (visibility,
//! neighbour lookup) and width bookkeeping belong to the owning table, which
//! passes the resolved pair into [`ResizeController::start`] and drives
//! [`ResizeController::settle`] once a commit or cancel has been applied.

use serde::{Deserialize, Serialize};

use crate::ColumnId;
use crate::error::LayoutError;
use crate::sizing::ActiveResize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizePhase {
    #[default]
    Idle,
    Dragging,
    Committing,
    Cancelling,
}

/// A live drag on the boundary between `column` and `neighbor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeSession {
    pub column: ColumnId,
    pub neighbor: ColumnId,
    /// Width of `column` when the drag began.
    pub start_width: u32,
    pub neighbor_start_width: u32,
    pub initial_pointer_x: i32,
    pub accumulated_delta: i64,
}

impl ResizeSession {
    #[must_use]
    pub fn active_resize(&self) -> ActiveResize {
        ActiveResize {
            column: self.column.clone(),
            start_width: self.start_width,
            accumulated_delta: self.accumulated_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeTransitionKind {
    Start,
    Update,
    Commit,
    Cancel,
    /// Cleanup reset from [`ResizeController::force_cancel`].
    ForceCancel,
    /// Committing/Cancelling back to Idle.
    Settle,
}

impl ResizeTransitionKind {
    /// Snapshot event name for this transition.
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Start => "resize_start",
            Self::Update => "resize_update",
            Self::Commit => "resize_commit",
            Self::Cancel | Self::ForceCancel => "resize_cancel",
            Self::Settle => "resize_settle",
        }
    }
}

/// One lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeTransition {
    pub transition_id: u64,
    pub kind: ResizeTransitionKind,
    pub from: ResizePhase,
    pub to: ResizePhase,
    pub column: ColumnId,
    pub accumulated_delta: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ResizeController {
    phase: ResizePhase,
    session: Option<ResizeSession>,
    transition_counter: u64,
}

impl ResizeController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn phase(&self) -> ResizePhase {
        self.phase
    }

    /// Whether a gesture owns the controller (any phase but Idle).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self.phase, ResizePhase::Idle)
    }

    #[must_use]
    pub const fn session(&self) -> Option<&ResizeSession> {
        self.session.as_ref()
    }

    /// The session as a sizing override, only while dragging.
    #[must_use]
    pub fn active_resize(&self) -> Option<ActiveResize> {
        match self.phase {
            ResizePhase::Dragging => self.session.as_ref().map(ResizeSession::active_resize),
            _ => None,
        }
    }

    #[must_use]
    pub const fn transition_count(&self) -> u64 {
        self.transition_counter
    }

    /// Open a session. Fails with `ResizeInProgress` if one is already open.
    pub fn start(
        &mut self,
        column: ColumnId,
        neighbor: ColumnId,
        start_width: u32,
        neighbor_start_width: u32,
        pointer_x: i32,
    ) -> Result<ResizeTransition, LayoutError> {
        if let Some(current) = &self.session {
            return Err(LayoutError::ResizeInProgress {
                column: current.column.clone(),
            });
        }
        let transition = self.transition(
            ResizeTransitionKind::Start,
            ResizePhase::Dragging,
            &column,
            0,
        );
        self.session = Some(ResizeSession {
            column,
            neighbor,
            start_width,
            neighbor_start_width,
            initial_pointer_x: pointer_x,
            accumulated_delta: 0,
        });
        Ok(transition)
    }

    /// Move the pointer. The delta is always measured from the start position.
    pub fn update(&mut self, pointer_x: i32) -> Result<ResizeTransition, LayoutError> {
        let session = self.dragging_session_mut()?;
        session.accumulated_delta = i64::from(pointer_x) - i64::from(session.initial_pointer_x);
        let (column, delta) = (session.column.clone(), session.accumulated_delta);
        Ok(self.transition(
            ResizeTransitionKind::Update,
            ResizePhase::Dragging,
            &column,
            delta,
        ))
    }

    /// Enter `Committing`; the caller persists and then calls [`settle`](Self::settle).
    pub fn commit(&mut self) -> Result<(ResizeSession, ResizeTransition), LayoutError> {
        self.finish(ResizeTransitionKind::Commit, ResizePhase::Committing)
    }

    /// Enter `Cancelling`; the caller restores widths and then calls [`settle`](Self::settle).
    pub fn cancel(&mut self) -> Result<(ResizeSession, ResizeTransition), LayoutError> {
        self.finish(ResizeTransitionKind::Cancel, ResizePhase::Cancelling)
    }

    /// Return to Idle after a commit or cancel. `None` if there was nothing to settle.
    pub fn settle(&mut self) -> Option<ResizeTransition> {
        let column = match self.phase {
            ResizePhase::Committing | ResizePhase::Cancelling => self
                .session
                .take()
                .map(|s| s.column)
                .unwrap_or_else(|| ColumnId::from("")),
            ResizePhase::Idle | ResizePhase::Dragging => return None,
        };
        Some(self.transition(ResizeTransitionKind::Settle, ResizePhase::Idle, &column, 0))
    }

    /// Unconditionally reset to Idle, e.g. on teardown.
    ///
    /// Returns `None` when already idle.
    pub fn force_cancel(&mut self) -> Option<ResizeTransition> {
        if !self.is_active() {
            return None;
        }
        let (column, delta) = self
            .session
            .take()
            .map(|s| (s.column, s.accumulated_delta))
            .unwrap_or_else(|| (ColumnId::from(""), 0));
        Some(self.transition(
            ResizeTransitionKind::ForceCancel,
            ResizePhase::Idle,
            &column,
            delta,
        ))
    }

    fn finish(
        &mut self,
        kind: ResizeTransitionKind,
        to: ResizePhase,
    ) -> Result<(ResizeSession, ResizeTransition), LayoutError> {
        let session = self.dragging_session_mut()?.clone();
        let transition = self.transition(kind, to, &session.column, session.accumulated_delta);
        Ok((session, transition))
    }

    fn dragging_session_mut(&mut self) -> Result<&mut ResizeSession, LayoutError> {
        match (self.phase, self.session.as_mut()) {
            (ResizePhase::Dragging, Some(session)) => Ok(session),
            _ => Err(LayoutError::NoActiveResize),
        }
    }

    fn transition(
        &mut self,
        kind: ResizeTransitionKind,
        to: ResizePhase,
        column: &ColumnId,
        accumulated_delta: i64,
    ) -> ResizeTransition {
        let from = self.phase;
        self.phase = to;
        self.transition_counter = self.transition_counter.saturating_add(1);
        ResizeTransition {
            transition_id: self.transition_counter,
            kind,
            from,
            to,
            column: column.clone(),
            accumulated_delta,
        }
    }
}
