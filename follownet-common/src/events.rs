//! Session progress events
//!
//! `ProgressEvent` is the closed set of events a session emits onto its
//! outbound stream. The serde representation is the wire format: one JSON
//! object per event, tagged by `type`.
//!
//! Only `Progress` may be coalesced or dropped under backpressure. Every other
//! variant is lossless. Exactly one terminal event (`stopped`, `complete` or
//! `error`) ends a stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::control::ControlState;
use crate::platform::Platform;
use crate::record::Record;

/// Failure category carried by `error` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request parameters rejected before a worker started
    Validation,
    /// URL does not map to a platform with an extractor
    UnsupportedPlatform,
    /// Extractor could not continue
    FatalExtraction,
    /// Worker ignored a stop request for longer than the grace period
    ShutdownTimeout,
    /// Anything else that ended the session unexpectedly
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Validation => "validation",
            ErrorKind::UnsupportedPlatform => "unsupported_platform",
            ErrorKind::FatalExtraction => "fatal_extraction",
            ErrorKind::ShutdownTimeout => "shutdown_timeout",
            ErrorKind::Internal => "internal",
        })
    }
}

/// Counters attached to progress-bearing events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

/// Events emitted on a session stream, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Session accepted and worker about to start
    #[serde(rename = "start")]
    Started {
        session_id: Uuid,
        message: String,
        #[serde(flatten)]
        fields: ProgressFields,
    },

    /// Source URL mapped to a platform
    #[serde(rename = "platform")]
    PlatformResolved {
        platform: Platform,
        message: String,
        #[serde(flatten)]
        fields: ProgressFields,
    },

    /// Intermediate progress tick (lossy)
    #[serde(rename = "progress")]
    Progress {
        message: String,
        #[serde(flatten)]
        fields: ProgressFields,
    },

    /// One newly accepted record
    #[serde(rename = "user_completed")]
    RecordReady {
        user_data: Record,
        message: String,
        #[serde(flatten)]
        fields: ProgressFields,
    },

    /// A pause/resume/stop request took effect
    #[serde(rename = "control")]
    ControlAcknowledged { state: ControlState, message: String },

    /// Terminal: caller-initiated stop finished
    #[serde(rename = "stopped")]
    Stopped {
        message: String,
        #[serde(default)]
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        download_url: Option<String>,
    },

    /// Terminal: extraction finished; `data` is the final snapshot
    #[serde(rename = "complete")]
    Completed {
        data: Vec<Record>,
        total: usize,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        download_url: Option<String>,
    },

    /// Terminal: session failed
    #[serde(rename = "error")]
    Failed { kind: ErrorKind, message: String },
}

impl ProgressEvent {
    /// Wire tag of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::Started { .. } => "start",
            ProgressEvent::PlatformResolved { .. } => "platform",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::RecordReady { .. } => "user_completed",
            ProgressEvent::ControlAcknowledged { .. } => "control",
            ProgressEvent::Stopped { .. } => "stopped",
            ProgressEvent::Completed { .. } => "complete",
            ProgressEvent::Failed { .. } => "error",
        }
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        match self {
            ProgressEvent::Stopped { .. }
            | ProgressEvent::Completed { .. }
            | ProgressEvent::Failed { .. } => true,
            ProgressEvent::Started { .. }
            | ProgressEvent::PlatformResolved { .. }
            | ProgressEvent::Progress { .. }
            | ProgressEvent::RecordReady { .. }
            | ProgressEvent::ControlAcknowledged { .. } => false,
        }
    }

    /// Whether this event may be dropped under backpressure
    pub fn is_lossy(&self) -> bool {
        matches!(self, ProgressEvent::Progress { .. })
    }

    /// Build a `Failed` event
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        ProgressEvent::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Serialize as one line-delimited JSON message
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
