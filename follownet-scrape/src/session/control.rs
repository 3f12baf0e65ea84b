//! Control channel between a session's callers and its worker
//!
//! The caller side (`ControlHandle`) applies pause/resume/stop requests to a
//! watch channel. The worker side (`ControlToken`) observes the latest state
//! at its checkpoints and parks while paused.

use std::sync::Arc;

use follownet_common::{ControlSignal, ControlState};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

/// Result of a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlOutcome {
    /// Whether the request changed the state
    pub accepted: bool,
    /// State after the request
    pub state: ControlState,
}

/// What a worker should do after a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

/// Caller side of a session's control state
#[derive(Debug, Clone)]
pub struct ControlHandle {
    state: Arc<watch::Sender<ControlState>>,
    acks: mpsc::UnboundedSender<ControlState>,
}

impl ControlHandle {
    /// New handle in `Running`, plus the receiver of accepted transitions
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControlState>) {
        let (state, _) = watch::channel(ControlState::Running);
        let (acks, ack_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(state),
                acks,
            },
            ack_rx,
        )
    }

    pub fn state(&self) -> ControlState {
        *self.state.borrow()
    }

    /// Worker-side view of this handle
    pub fn token(&self) -> ControlToken {
        ControlToken {
            rx: self.state.subscribe(),
        }
    }

    /// Apply a caller's request
    ///
    /// Accepted transitions are queued for acknowledgement on the session
    /// stream in the order they were applied. Invalid requests leave the
    /// state untouched and report `accepted: false`.
    pub fn request(&self, signal: ControlSignal) -> ControlOutcome {
        self.transition(signal, true)
    }

    /// Stop requested by the session itself (limit reached, client gone)
    pub(crate) fn request_internal_stop(&self) -> ControlOutcome {
        self.transition(ControlSignal::Stop, false)
    }

    /// Worker has exited; no further transitions are possible
    pub(crate) fn mark_stopped(&self) {
        self.state.send_replace(ControlState::Stopped);
    }

    fn transition(&self, signal: ControlSignal, acknowledge: bool) -> ControlOutcome {
        let mut accepted = false;
        self.state.send_if_modified(|state| match state.apply(signal) {
            Some(next) => {
                *state = next;
                accepted = true;
                if acknowledge {
                    // Receiver lives as long as the session driver
                    let _ = self.acks.send(next);
                }
                true
            }
            None => false,
        });
        ControlOutcome {
            accepted,
            state: self.state(),
        }
    }
}

/// Worker side of a session's control state
#[derive(Debug, Clone)]
pub struct ControlToken {
    rx: watch::Receiver<ControlState>,
}

impl ControlToken {
    pub fn state(&self) -> ControlState {
        *self.rx.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.state().is_stopping()
    }

    /// Suspension point for extractors
    ///
    /// Returns immediately while running, parks without polling while paused
    /// and reports `Stop` once a stop was requested.
    pub async fn checkpoint(&mut self) -> Checkpoint {
        loop {
            let state = *self.rx.borrow_and_update();
            match state {
                ControlState::Running => return Checkpoint::Continue,
                ControlState::Stopping | ControlState::Stopped => return Checkpoint::Stop,
                ControlState::Paused => {
                    if self.rx.changed().await.is_err() {
                        return Checkpoint::Stop;
                    }
                }
            }
        }
    }
}
