//! Session control state machine
//!
//! `Running ⇄ Paused`, either of them → `Stopping` → `Stopped`. `Stopped` is
//! final: no signal moves a session out of it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Control state shared by a session's caller side and its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Running,
    Paused,
    Stopping,
    Stopped,
}

/// Control request sent by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    Pause,
    Resume,
    Stop,
}

impl ControlState {
    /// State reached by applying `signal`, or `None` when the signal is not
    /// valid from the current state (the caller acknowledges it as a no-op).
    pub fn apply(self, signal: ControlSignal) -> Option<ControlState> {
        match (self, signal) {
            (ControlState::Running, ControlSignal::Pause) => Some(ControlState::Paused),
            (ControlState::Paused, ControlSignal::Resume) => Some(ControlState::Running),
            (ControlState::Running | ControlState::Paused, ControlSignal::Stop) => {
                Some(ControlState::Stopping)
            }
            _ => None,
        }
    }

    /// Whether the worker should wind down
    pub fn is_stopping(self) -> bool {
        matches!(self, ControlState::Stopping | ControlState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Running => "running",
            ControlState::Paused => "paused",
            ControlState::Stopping => "stopping",
            ControlState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlSignal::Pause => "pause",
            ControlSignal::Resume => "resume",
            ControlSignal::Stop => "stop",
        })
    }
}
