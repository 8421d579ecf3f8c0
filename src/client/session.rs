//! # Session State Machine
//!
//! Tracks the lifecycle of the one submission a client may have in flight.
//!
//! ```text
//!            Begin                Delivered
//!   Idle ───────────▶ Uploading ───────────▶ Done
//!   Done/Error/Failed ──▶ │       Rejected
//!                         ├──────────────────▶ Error
//!                         │  TransportFailed / Aborted
//!                         └──────────────────▶ Failed
//! ```
//!
//! Phases change only through [`transition`], a pure function, so the rules
//! can be tested without a client or a network. The [`Session`] wraps a
//! [`SessionState`] together with the single-flight flag; a [`BusyGuard`]
//! holds that flag for the duration of a submission and clears it on drop.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::common::error::ValidationError;
use crate::common::messages::{Operation, SelectedFile};

pub const UPLOADING_TEXT: &str = "Uploading...";
pub const DONE_TEXT: &str = "Done";
pub const WORKING_LABEL: &str = "Working...";

/// Where the current (or last) submission stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Uploading,
    Done,
    Error,
    Failed,
}

impl Phase {
    /// Whether this phase ends a submission.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error | Phase::Failed)
    }
}

/// What the presentation surface renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub phase: Phase,
    pub status_text: String,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A validated request is about to be sent.
    Begin,
    /// The artifact was handed to the save target.
    Delivered,
    /// The service answered with an error.
    Rejected { message: String },
    /// The exchange or the local save broke down.
    TransportFailed { reason: String },
    /// The submission was dropped while still uploading.
    Aborted,
    /// Inputs were rejected before sending; only the status text changes.
    Invalid(ValidationError),
}

/// Compute the state following `event`, or `None` if the event is not
/// allowed in the current phase.
pub fn transition(state: &SessionState, event: SessionEvent) -> Option<SessionState> {
    let uploading = state.phase == Phase::Uploading;

    let next = match event {
        SessionEvent::Begin if !uploading => SessionState {
            phase: Phase::Uploading,
            status_text: UPLOADING_TEXT.to_string(),
        },
        SessionEvent::Delivered if uploading => SessionState {
            phase: Phase::Done,
            status_text: DONE_TEXT.to_string(),
        },
        SessionEvent::Rejected { message } if uploading => SessionState {
            phase: Phase::Error,
            status_text: message,
        },
        SessionEvent::TransportFailed { reason } if uploading => SessionState {
            phase: Phase::Failed,
            status_text: failure_text(&reason),
        },
        SessionEvent::Aborted if uploading => SessionState {
            phase: Phase::Failed,
            status_text: failure_text("submission aborted"),
        },
        SessionEvent::Invalid(err) if !uploading => SessionState {
            phase: state.phase,
            status_text: err.to_string(),
        },
        _ => return None,
    };

    Some(next)
}

/// Status text for a transport-level failure.
pub fn failure_text(reason: &str) -> String {
    format!("Upload failed: {}", reason)
}

/// Caption for the current file selection, if any.
pub fn selected_caption(file: Option<&SelectedFile>) -> Option<String> {
    file.map(|f| format!("Selected: {}", f.name))
}

/// Session state plus the single-flight flag, shared between the core
/// client and the presentation surface.
#[derive(Debug, Default)]
pub struct Session {
    busy: AtomicBool,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a submission currently holds the busy guard.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Copy of the current state for rendering.
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn status_text(&self) -> String {
        self.lock().status_text.clone()
    }

    /// Label for the submit action: `Working...` while busy, otherwise
    /// the operation's own label.
    pub fn action_label(&self, operation: Operation) -> &'static str {
        if self.is_busy() {
            WORKING_LABEL
        } else {
            operation.label()
        }
    }

    /// Apply `event`, returning whether the state changed.
    pub(crate) fn apply(&self, event: SessionEvent) -> bool {
        let mut state = self.lock();
        apply_locked(&mut state, event)
    }

    /// Take the busy guard and move to `Uploading`.
    ///
    /// Returns `None` without touching the state if another submission
    /// already holds the guard.
    pub(crate) fn try_begin(&self) -> Option<BusyGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let guard = BusyGuard { session: self };
        self.apply(SessionEvent::Begin);
        Some(guard)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State stays consistent even if a holder panicked; every write is a
        // whole-value replacement.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_locked(state: &mut SessionState, event: SessionEvent) -> bool {
    let label = format!("{:?}", event);
    match transition(state, event) {
        Some(next) => {
            debug!("Session {:?} -> {:?}", state.phase, next.phase);
            *state = next;
            true
        }
        None => {
            warn!("Ignoring {} in phase {:?}", label, state.phase);
            false
        }
    }
}

/// Holds the single-flight flag for one submission.
///
/// Dropping the guard always clears the flag. If the session is still
/// `Uploading` at that point (the submission future was cancelled or
/// panicked) the phase is first moved to `Failed`.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    session: &'a Session,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.session.lock();
            if state.phase == Phase::Uploading {
                apply_locked(&mut state, SessionEvent::Aborted);
            }
        }
        self.session.busy.store(false, Ordering::Release);
    }
}
