//! # FollowNet Common Library
//!
//! Shared vocabulary for FollowNet services:
//! - Platform resolution (URL → platform)
//! - Extracted records and their identity keys
//! - Session control states and signals
//! - Session progress events (wire format)
//! - Configuration loading
//! - SSE helpers

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod platform;
pub mod record;
pub mod sse;

pub use control::{ControlSignal, ControlState};
pub use error::{Error, Result};
pub use events::{ErrorKind, ProgressEvent, ProgressFields};
pub use platform::{resolve, Platform};
pub use record::{Record, RecordKey, RecordKind};
