//! Session registry and per-session driver
//!
//! `SessionManager::create` validates a request, registers the session and
//! spawns its driver. The driver owns the extractor stream, the emitter and
//! the accumulator writes; it multiplexes extractor items, acknowledged
//! control transitions, consumer disconnects, the stop grace deadline and
//! service shutdown in a single `select!` loop.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use follownet_common::{
    resolve, ControlSignal, ControlState, ErrorKind, Platform, ProgressEvent, Record,
};
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    download_url, ControlHandle, ControlOutcome, EmitError, EventEmitter, FinalSnapshot,
    LimitParam, ProgressTracker, ResultAccumulator, SessionPhase, SessionRequest,
    SessionSettings, SessionStatus, SessionStream, SnapshotStore, MAX_PAGE,
};
use crate::error::SessionError;
use crate::extractor::{ExtractionError, ExtractionRequest, Extractor, ExtractorItem, ExtractorRegistry};

type SessionMap = Arc<RwLock<HashMap<Uuid, Arc<Session>>>>;

/// Shared state of one live session
struct Session {
    id: Uuid,
    url: String,
    platform: Platform,
    limit: usize,
    page: u32,
    created_at: DateTime<Utc>,
    control: ControlHandle,
    accumulator: RwLock<ResultAccumulator>,
    progress: RwLock<ProgressTracker>,
    outcome: RwLock<Option<SessionPhase>>,
}

impl Session {
    async fn status(&self) -> SessionStatus {
        let control_state = self.control.state();
        let phase = self
            .outcome
            .read()
            .await
            .unwrap_or_else(|| control_state.into());
        let progress = self.progress.read().await;
        SessionStatus {
            session_id: self.id,
            url: self.url.clone(),
            platform: self.platform,
            phase,
            control_state,
            limit: self.limit,
            page: self.page,
            accepted: self.accumulator.read().await.len(),
            processed: progress.processed(),
            total: progress.total(),
            progress: progress.percent(),
            created_at: self.created_at,
        }
    }
}

/// Validated session parameters
struct Admission {
    url: String,
    platform: Platform,
    extractor: Arc<dyn Extractor>,
    limit: usize,
    page: u32,
}

/// Creates, tracks and controls extraction sessions
#[derive(Clone)]
pub struct SessionManager {
    sessions: SessionMap,
    extractors: Arc<ExtractorRegistry>,
    settings: Arc<SessionSettings>,
    snapshots: SnapshotStore,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(extractors: ExtractorRegistry, settings: SessionSettings) -> Self {
        let snapshots = SnapshotStore::new(settings.snapshot_ttl, settings.snapshot_capacity);
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            extractors: Arc::new(extractors),
            settings: Arc::new(settings),
            snapshots,
            shutdown: CancellationToken::new(),
        }
    }

    /// Finished sessions still available for export
    pub async fn retained_snapshots(&self) -> usize {
        self.snapshots.len().await
    }

    /// Platforms that can currently be extracted
    pub fn platforms(&self) -> Vec<Platform> {
        self.extractors.platforms()
    }

    /// Start a session and return its event stream
    ///
    /// Rejected requests still get a stream: it carries a single `error`
    /// event and no session is registered.
    pub async fn create(&self, request: SessionRequest) -> SessionStream {
        let (emitter, events) =
            EventEmitter::channel(self.settings.event_buffer, self.settings.idle_timeout);

        let admission = match self.admit(&request) {
            Ok(admission) => admission,
            Err(rejection) => {
                if let ProgressEvent::Failed { kind, message } = &rejection {
                    warn!("Rejected session for {:?}: {} ({})", request.url, message, kind);
                }
                // A fresh channel always has room for one event
                let _ = emitter.finish(rejection).await;
                return SessionStream {
                    session_id: None,
                    events,
                };
            }
        };

        let id = Uuid::new_v4();
        let (control, acks) = ControlHandle::new();
        let session = Arc::new(Session {
            id,
            url: admission.url,
            platform: admission.platform,
            limit: admission.limit,
            page: admission.page,
            created_at: Utc::now(),
            control,
            accumulator: RwLock::new(ResultAccumulator::new()),
            progress: RwLock::new(ProgressTracker::new(admission.limit)),
            outcome: RwLock::new(None),
        });
        self.sessions.write().await.insert(id, Arc::clone(&session));

        info!(
            session_id = %id,
            platform = %session.platform,
            "Session created: {} (limit {}, page {})",
            session.url,
            session.limit,
            session.page
        );

        let driver = SessionDriver {
            session,
            extractor: admission.extractor,
            emitter: Some(emitter),
            acks,
            settings: Arc::clone(&self.settings),
            snapshots: self.snapshots.clone(),
            sessions: Arc::clone(&self.sessions),
            shutdown: self.shutdown.clone(),
            stop_cause: None,
            deadline: None,
        };
        tokio::spawn(driver.run());

        SessionStream {
            session_id: Some(id),
            events,
        }
    }

    /// Apply a control signal to a live session
    pub async fn control(
        &self,
        session_id: Uuid,
        signal: ControlSignal,
    ) -> Result<ControlOutcome, SessionError> {
        let session = self.get(session_id).await?;
        let outcome = session.control.request(signal);
        if outcome.accepted {
            info!(session_id = %session_id, "{} accepted, now {}", signal, outcome.state);
        } else {
            debug!(
                "Session {}: {} ignored in state {}",
                session_id, signal, outcome.state
            );
        }
        Ok(outcome)
    }

    pub async fn pause(&self, session_id: Uuid) -> Result<ControlOutcome, SessionError> {
        self.control(session_id, ControlSignal::Pause).await
    }

    pub async fn resume(&self, session_id: Uuid) -> Result<ControlOutcome, SessionError> {
        self.control(session_id, ControlSignal::Resume).await
    }

    pub async fn stop(&self, session_id: Uuid) -> Result<ControlOutcome, SessionError> {
        self.control(session_id, ControlSignal::Stop).await
    }

    pub async fn status(&self, session_id: Uuid) -> Result<SessionStatus, SessionError> {
        Ok(self.get(session_id).await?.status().await)
    }

    /// Status of every live session, oldest first
    pub async fn list(&self) -> Vec<SessionStatus> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(sessions.len());
        for session in sessions {
            statuses.push(session.status().await);
        }
        statuses.sort_by_key(|s| s.created_at);
        statuses
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Records available for export
    ///
    /// Finished sessions are served from the snapshot store; a live session
    /// yields a snapshot of what it has accepted so far.
    pub async fn snapshot(&self, session_id: Uuid) -> Result<FinalSnapshot, SessionError> {
        if let Some(snapshot) = self.snapshots.get(session_id).await {
            return Ok(snapshot);
        }
        let session = self
            .get(session_id)
            .await
            .map_err(|_| SessionError::SnapshotNotFound(session_id))?;
        let records = session.accumulator.read().await.snapshot();
        Ok(FinalSnapshot {
            session_id,
            platform: session.platform,
            records: Arc::new(records),
        })
    }

    /// Stop every session and wait for them to wind down
    ///
    /// Returns `false` if sessions were still registered when `timeout`
    /// elapsed.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let active = self.active_count().await;
        info!("Stopping {} active session(s)", active);
        self.shutdown.cancel();

        let deadline = Instant::now() + timeout;
        loop {
            if self.active_count().await == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} session(s) still active after {:?}",
                    self.active_count().await,
                    timeout
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn get(&self, session_id: Uuid) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::NotFound(session_id))
    }

    fn admit(&self, request: &SessionRequest) -> Result<Admission, ProgressEvent> {
        let invalid = |message: String| ProgressEvent::failed(ErrorKind::Validation, message);

        if self.shutdown.is_cancelled() {
            return Err(ProgressEvent::failed(
                ErrorKind::Internal,
                "Service is shutting down",
            ));
        }

        let url = request.url.trim();
        if url.is_empty() {
            return Err(invalid("url must not be empty".into()));
        }

        let hard_limit = self.settings.hard_limit;
        let limit = match &request.limit {
            None => self.settings.default_limit,
            Some(LimitParam::Count(n)) if *n <= 0 => {
                return Err(invalid(format!(
                    "max_users must be a positive integer, got {}",
                    n
                )));
            }
            Some(LimitParam::Count(n)) => usize::try_from(*n).unwrap_or(hard_limit),
            Some(LimitParam::Keyword(k)) if k.trim().eq_ignore_ascii_case("unlimited") => {
                hard_limit
            }
            Some(LimitParam::Keyword(k)) => {
                return Err(invalid(format!(
                    "max_users must be a positive integer or \"unlimited\", got {:?}",
                    k
                )));
            }
        }
        .min(hard_limit);

        let page = match request.page {
            None => 1,
            Some(p) => match u32::try_from(p) {
                Ok(p) if (1..=MAX_PAGE).contains(&p) => p,
                _ => {
                    return Err(invalid(format!(
                        "page must be between 1 and {}, got {}",
                        MAX_PAGE, p
                    )));
                }
            },
        };

        let platform = resolve(url).ok_or_else(|| {
            ProgressEvent::failed(
                ErrorKind::UnsupportedPlatform,
                format!("Unsupported platform: {}", url),
            )
        })?;
        let extractor = self.extractors.get(platform).ok_or_else(|| {
            ProgressEvent::failed(
                ErrorKind::UnsupportedPlatform,
                format!("No extractor available for {}", platform.display_name()),
            )
        })?;

        Ok(Admission {
            url: url.to_string(),
            platform,
            extractor,
            limit,
            page,
        })
    }
}

/// Why a session is winding down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    Caller,
    LimitReached,
    ConsumerGone,
    Shutdown,
}

/// How the extractor stream ended
enum Exit {
    Exhausted,
    Fatal(ExtractionError),
    Panicked,
    GraceExpired,
}

/// Single writer for one session
struct SessionDriver {
    session: Arc<Session>,
    extractor: Arc<dyn Extractor>,
    /// `None` once the consumer is gone
    emitter: Option<EventEmitter>,
    acks: mpsc::UnboundedReceiver<ControlState>,
    settings: Arc<SessionSettings>,
    snapshots: SnapshotStore,
    sessions: SessionMap,
    shutdown: CancellationToken,
    stop_cause: Option<StopCause>,
    deadline: Option<Instant>,
}

impl SessionDriver {
    async fn run(mut self) {
        let session = Arc::clone(&self.session);
        let platform = session.platform;

        let fields = session.progress.read().await.fields();
        self.send(ProgressEvent::Started {
            session_id: session.id,
            message: format!("Started extracting from {}", session.url),
            fields: fields.clone(),
        })
        .await;
        self.send(ProgressEvent::PlatformResolved {
            platform,
            message: format!("Detected platform: {}", platform.display_name()),
            fields,
        })
        .await;

        let request = ExtractionRequest {
            url: session.url.clone(),
            page: session.page,
            limit: session.limit,
        };
        let mut stream = self.extractor.run(request, session.control.token());
        let mut shutdown_seen = false;

        let exit = loop {
            let grace = self.deadline;
            let watching_consumer = self.emitter.is_some();
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled(), if !shutdown_seen => {
                    shutdown_seen = true;
                    info!("Session {}: service shutdown, stopping", session.id);
                    self.begin_stop(StopCause::Shutdown);
                }
                Some(state) = self.acks.recv() => {
                    self.acknowledge(state).await;
                }
                _ = consumer_closed(&self.emitter), if watching_consumer => {
                    self.consumer_gone();
                }
                _ = tokio::time::sleep_until(grace.unwrap_or_else(Instant::now)), if grace.is_some() => {
                    break Exit::GraceExpired;
                }
                item = AssertUnwindSafe(stream.next()).catch_unwind() => match item {
                    Err(_) => break Exit::Panicked,
                    Ok(None) => break Exit::Exhausted,
                    Ok(Some(Err(e))) => break Exit::Fatal(e),
                    Ok(Some(Ok(item))) => self.handle(item).await,
                },
            }
        };

        // Releases whatever the extractor still holds
        drop(stream);

        // Requests accepted before this point are already queued
        session.control.mark_stopped();
        while let Ok(state) = self.acks.try_recv() {
            self.acknowledge(state).await;
        }
        self.finish(exit).await;
    }

    async fn handle(&mut self, item: ExtractorItem) {
        match item {
            ExtractorItem::Total(total) => {
                self.session.progress.write().await.set_reported_total(total);
                self.tick(format!("Found {} accounts", total)).await;
            }
            ExtractorItem::Stage { stage, message } => {
                self.session.progress.write().await.set_stage(stage);
                self.tick(message).await;
            }
            ExtractorItem::Visiting(entity) => {
                let message = format!("Fetching {}", entity);
                self.session.progress.write().await.set_current(entity);
                self.tick(message).await;
            }
            ExtractorItem::Skipped { entity, reason } => {
                warn!("Session {}: skipped {}: {}", self.session.id, entity, reason);
                let message = format!("Skipped {}: {}", entity, reason);
                self.session.progress.write().await.visit(entity);
                self.tick(message).await;
            }
            ExtractorItem::Record(record) => self.accept(record).await,
        }
    }

    async fn accept(&mut self, record: Record) {
        let username = record.username.clone();
        let fields = {
            let mut progress = self.session.progress.write().await;
            progress.visit(username.clone());
            progress.fields()
        };

        if self.session.control.state().is_stopping() {
            debug!(
                "Session {}: discarding {} received after stop",
                self.session.id, username
            );
            return;
        }

        let (accepted, count) = {
            let mut accumulator = self.session.accumulator.write().await;
            let accepted = accumulator.append(record.clone());
            (accepted, accumulator.len())
        };

        if !accepted {
            debug!("Session {}: duplicate {}", self.session.id, username);
            self.send(ProgressEvent::Progress {
                message: format!("Skipped duplicate {}", username),
                fields,
            })
            .await;
            return;
        }

        self.send(ProgressEvent::RecordReady {
            user_data: record,
            message: format!("Collected {} ({}/{})", username, count, self.session.limit),
            fields,
        })
        .await;

        if count >= self.session.limit {
            info!(
                "Session {}: limit of {} reached",
                self.session.id, self.session.limit
            );
            self.begin_stop(StopCause::LimitReached);
        }
    }

    async fn acknowledge(&mut self, state: ControlState) {
        let message = match state {
            ControlState::Paused => "Extraction paused",
            ControlState::Running => "Extraction resumed",
            ControlState::Stopping => "Stop requested, finishing current item",
            ControlState::Stopped => "Extraction stopped",
        };
        if state == ControlState::Stopping {
            self.stop_cause.get_or_insert(StopCause::Caller);
            self.arm_deadline();
        }
        self.send(ProgressEvent::ControlAcknowledged {
            state,
            message: message.to_string(),
        })
        .await;
    }

    /// Wind the session down on the driver's own initiative
    fn begin_stop(&mut self, cause: StopCause) {
        if self.stop_cause.is_none() {
            let outcome = self.session.control.request_internal_stop();
            // Not accepted means a caller's stop got there first
            self.stop_cause = Some(if outcome.accepted {
                cause
            } else {
                StopCause::Caller
            });
        }
        self.arm_deadline();
    }

    fn arm_deadline(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.settings.grace_period);
        }
    }

    fn consumer_gone(&mut self) {
        if self.emitter.take().is_some() {
            info!("Session {}: consumer disconnected, stopping", self.session.id);
            self.begin_stop(StopCause::ConsumerGone);
        }
    }

    async fn tick(&mut self, message: String) {
        let fields = self.session.progress.read().await.fields();
        self.send(ProgressEvent::Progress { message, fields }).await;
    }

    async fn send(&mut self, event: ProgressEvent) {
        let Some(emitter) = self.emitter.as_mut() else {
            return;
        };
        match emitter.emit(event).await {
            Ok(()) => {}
            Err(EmitError::Disconnected) => self.consumer_gone(),
            Err(EmitError::Stalled) => {
                warn!(
                    "Session {}: consumer stalled for {:?}",
                    self.session.id, self.settings.idle_timeout
                );
                self.consumer_gone();
            }
        }
    }

    async fn finish(mut self, exit: Exit) {
        let session = Arc::clone(&self.session);

        let records = {
            let mut accumulator = session.accumulator.write().await;
            accumulator.close();
            accumulator.snapshot()
        };
        let total = records.len();

        let (phase, terminal) = match exit {
            Exit::Fatal(e) => {
                error!(session_id = %session.id, "Extraction failed: {}", e);
                (
                    SessionPhase::Failed,
                    ProgressEvent::failed(ErrorKind::FatalExtraction, e.to_string()),
                )
            }
            Exit::Panicked => {
                error!(session_id = %session.id, "Extractor panicked");
                (
                    SessionPhase::Failed,
                    ProgressEvent::failed(ErrorKind::Internal, "Extractor panicked"),
                )
            }
            Exit::GraceExpired => {
                warn!(
                    "Session {}: extractor ignored stop for {:?}, releasing",
                    session.id, self.settings.grace_period
                );
                (
                    SessionPhase::Failed,
                    ProgressEvent::failed(
                        ErrorKind::ShutdownTimeout,
                        format!(
                            "Extractor did not stop within {} ms",
                            self.settings.grace_period.as_millis()
                        ),
                    ),
                )
            }
            Exit::Exhausted => {
                let link = if total > 0 {
                    self.snapshots
                        .insert(session.id, session.platform, records.clone())
                        .await;
                    Some(download_url(session.id))
                } else {
                    None
                };
                match self.stop_cause {
                    Some(StopCause::Caller | StopCause::Shutdown | StopCause::ConsumerGone) => (
                        SessionPhase::Stopped,
                        ProgressEvent::Stopped {
                            message: format!("Stopped after collecting {} records", total),
                            total,
                            download_url: link,
                        },
                    ),
                    None | Some(StopCause::LimitReached) => {
                        session.progress.write().await.finish();
                        (
                            SessionPhase::Completed,
                            ProgressEvent::Completed {
                                data: records,
                                total,
                                message: format!("Extraction complete: {} records", total),
                                download_url: link,
                            },
                        )
                    }
                }
            }
        };

        *session.outcome.write().await = Some(phase);
        self.sessions.write().await.remove(&session.id);
        info!(session_id = %session.id, "Session finished: {:?}, {} records", phase, total);

        if let Some(emitter) = self.emitter.take() {
            if let Err(e) = emitter.finish(terminal).await {
                debug!("Session {}: terminal event not delivered: {}", session.id, e);
            }
        }
    }
}

async fn consumer_closed(emitter: &Option<EventEmitter>) {
    match emitter {
        Some(emitter) => emitter.closed().await,
        None => std::future::pending().await,
    }
}
