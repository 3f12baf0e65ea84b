//! Per-session outbound event queue
//!
//! Progress ticks are offered without waiting: when the queue is full the
//! newest tick is held back and replaces any older held tick. Every other
//! event waits for queue space, bounded by the idle timeout. The held tick
//! is flushed (or dropped if there is still no room) ahead of the next
//! lossless event, so ordering is preserved.

use std::time::Duration;

use follownet_common::ProgressEvent;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tracing::debug;

/// Why an event could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmitError {
    /// Receiving side was dropped
    #[error("event consumer disconnected")]
    Disconnected,
    /// Consumer stopped reading for longer than the idle timeout
    #[error("event consumer stalled")]
    Stalled,
}

/// Sending half of a session stream
#[derive(Debug)]
pub struct EventEmitter {
    tx: mpsc::Sender<ProgressEvent>,
    held: Option<ProgressEvent>,
    idle_timeout: Duration,
    dropped: usize,
}

impl EventEmitter {
    /// Bounded stream with room for `capacity` undelivered events
    pub fn channel(
        capacity: usize,
        idle_timeout: Duration,
    ) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                held: None,
                idle_timeout,
                dropped: 0,
            },
            rx,
        )
    }

    /// Emit a non-terminal event
    pub async fn emit(&mut self, event: ProgressEvent) -> Result<(), EmitError> {
        debug_assert!(!event.is_terminal(), "terminal events go through finish()");
        if event.is_lossy() {
            return self.offer(event);
        }
        self.flush_held()?;
        self.send(event).await
    }

    /// Emit the terminal event and close the stream
    pub async fn finish(mut self, event: ProgressEvent) -> Result<(), EmitError> {
        debug_assert!(event.is_terminal(), "finish() takes a terminal event");
        self.flush_held()?;
        let result = self.send(event).await;
        if self.dropped > 0 {
            debug!("Coalesced {} progress events under backpressure", self.dropped);
        }
        result
    }

    /// Resolves once the consumer has gone away
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    fn offer(&mut self, event: ProgressEvent) -> Result<(), EmitError> {
        if self.held.take().is_some() {
            self.dropped += 1;
        }
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                self.held = Some(event);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(EmitError::Disconnected),
        }
    }

    fn flush_held(&mut self) -> Result<(), EmitError> {
        let Some(event) = self.held.take() else {
            return Ok(());
        };
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(EmitError::Disconnected),
        }
    }

    async fn send(&mut self, event: ProgressEvent) -> Result<(), EmitError> {
        match self.tx.send_timeout(event, self.idle_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(EmitError::Stalled),
            Err(SendTimeoutError::Closed(_)) => Err(EmitError::Disconnected),
        }
    }
}
