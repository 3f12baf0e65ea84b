//! Extraction sessions
//!
//! A session binds one source URL to one extractor run. Its driver task is
//! the only writer of the session's outbound stream; callers interact with
//! it through the `SessionManager` (create, control, inspect) and read its
//! events from the receiver returned at creation.

pub mod accumulator;
pub mod control;
pub mod emitter;
pub mod manager;
pub mod progress;
pub mod snapshot;

use std::time::Duration;

use chrono::{DateTime, Utc};
use follownet_common::config::SessionConfig;
use follownet_common::{ControlState, Platform, ProgressEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

pub use accumulator::ResultAccumulator;
pub use control::{Checkpoint, ControlHandle, ControlOutcome, ControlToken};
pub use emitter::{EmitError, EventEmitter};
pub use manager::SessionManager;
pub use progress::ProgressTracker;
pub use snapshot::{FinalSnapshot, SnapshotStore};

/// Tunables for every session a manager creates
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub default_limit: usize,
    pub hard_limit: usize,
    pub grace_period: Duration,
    pub idle_timeout: Duration,
    pub event_buffer: usize,
    pub snapshot_ttl: Duration,
    pub snapshot_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            hard_limit: config.hard_limit,
            grace_period: Duration::from_millis(config.grace_period_ms),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            event_buffer: config.event_buffer,
            snapshot_ttl: Duration::from_secs(config.snapshot_ttl_secs),
            snapshot_capacity: config.snapshot_capacity,
        }
    }
}

/// Highest first page a session may start from
pub const MAX_PAGE: u32 = 10_000;

/// Requested record limit, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitParam {
    Count(i64),
    Keyword(String),
}

/// Parameters for a new session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub url: String,
    pub page: Option<i64>,
    pub limit: Option<LimitParam>,
}

impl SessionRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page: None,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(LimitParam::Count(limit));
        self
    }

    pub fn unlimited(mut self) -> Self {
        self.limit = Some(LimitParam::Keyword("unlimited".into()));
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }
}

/// Externally visible lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Running,
    Paused,
    Stopping,
    Completed,
    Stopped,
    Failed,
}

impl From<ControlState> for SessionPhase {
    fn from(state: ControlState) -> Self {
        match state {
            ControlState::Running => SessionPhase::Running,
            ControlState::Paused => SessionPhase::Paused,
            ControlState::Stopping => SessionPhase::Stopping,
            ControlState::Stopped => SessionPhase::Stopped,
        }
    }
}

/// Point-in-time view of a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub url: String,
    pub platform: Platform,
    pub phase: SessionPhase,
    pub control_state: ControlState,
    pub limit: usize,
    pub page: u32,
    pub accepted: usize,
    pub processed: usize,
    pub total: usize,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
}

/// Consumer side of a session stream
#[derive(Debug)]
pub struct SessionStream {
    /// Absent when the request was rejected before a session existed
    pub session_id: Option<Uuid>,
    pub events: mpsc::Receiver<ProgressEvent>,
}

/// Download path for a retained snapshot
pub fn download_url(session_id: Uuid) -> String {
    format!("/api/export-csv/{}", session_id)
}
