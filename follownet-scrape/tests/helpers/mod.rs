//! Shared fixtures for follownet-scrape integration tests

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use follownet_common::{Platform, ProgressEvent, Record, RecordKind};
use follownet_scrape::extractor::{
    ExtractionError, ExtractionRequest, Extractor, ExtractorItem, ExtractorRegistry,
    ExtractorStream,
};
use follownet_scrape::session::{Checkpoint, ControlToken, SessionManager, SessionSettings};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Upper bound for any single wait in these tests
pub const PATIENCE: Duration = Duration::from_secs(10);

/// One scripted extractor step
#[derive(Debug, Clone)]
pub enum Step {
    Record(String),
    Skip(String),
    Fail(String),
    Panic(String),
}

/// Session to stop from inside the extractor once its script runs out
#[derive(Clone, Default)]
pub struct StopSwitch(Arc<Mutex<Option<(SessionManager, Uuid)>>>);

impl StopSwitch {
    pub fn arm(&self, manager: &SessionManager, session_id: Uuid) {
        *self.0.lock().unwrap() = Some((manager.clone(), session_id));
    }

    fn take(&self) -> Option<(SessionManager, Uuid)> {
        self.0.lock().unwrap().take()
    }
}

impl fmt::Debug for StopSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSwitch")
            .field("armed", &self.0.lock().unwrap().is_some())
            .finish()
    }
}

/// In-process extractor that replays a fixed script
#[derive(Debug, Clone)]
pub struct ScriptedExtractor {
    pub platform: Platform,
    pub steps: Vec<Step>,
    pub delay: Duration,
    pub honor_stop: bool,
    pub reported_total: Option<usize>,
    pub stop_on_exhaust: Option<StopSwitch>,
}

impl ScriptedExtractor {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            platform: Platform::GitHub,
            steps,
            delay: Duration::ZERO,
            honor_stop: true,
            reported_total: None,
            stop_on_exhaust: None,
        }
    }

    /// One record per name
    pub fn records(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| Step::Record(n.to_string())).collect())
    }

    /// `count` records named user0, user1, ...
    pub fn numbered(count: usize) -> Self {
        Self::new((0..count).map(|i| Step::Record(format!("user{}", i))).collect())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reporting_total(mut self, total: usize) -> Self {
        self.reported_total = Some(total);
        self
    }

    /// Stops the armed session right before the stream ends
    pub fn stopping_on_exhaust(mut self, switch: StopSwitch) -> Self {
        self.stop_on_exhaust = Some(switch);
        self
    }

    /// Never checks the control token and hangs once the script is done
    pub fn ignoring_stop(mut self) -> Self {
        self.honor_stop = false;
        self
    }
}

impl Extractor for ScriptedExtractor {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn run(&self, _request: ExtractionRequest, mut control: ControlToken) -> ExtractorStream {
        let script = self.clone();
        Box::pin(async_stream::stream! {
            if let Some(total) = script.reported_total {
                yield Ok(ExtractorItem::Total(total));
            }
            for step in script.steps {
                if script.honor_stop && control.checkpoint().await == Checkpoint::Stop {
                    break;
                }
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }
                match step {
                    Step::Record(name) => {
                        yield Ok(ExtractorItem::Visiting(name.clone()));
                        yield Ok(ExtractorItem::Record(Record::new(
                            script.platform,
                            RecordKind::Follower,
                            name,
                        )));
                    }
                    Step::Skip(name) => {
                        yield Ok(ExtractorItem::Skipped {
                            entity: name,
                            reason: "profile unavailable".to_string(),
                        });
                    }
                    Step::Fail(message) => {
                        yield Err(ExtractionError::Fatal(message));
                        break;
                    }
                    Step::Panic(message) => panic!("{}", message),
                }
            }
            let armed = script.stop_on_exhaust.as_ref().and_then(StopSwitch::take);
            if let Some((manager, session_id)) = armed {
                manager.stop(session_id).await.unwrap();
            }
            if !script.honor_stop {
                std::future::pending::<()>().await;
            }
        })
    }
}

/// Settings sized for tests: roomy buffers, short grace period
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        default_limit: 100,
        hard_limit: 1000,
        grace_period: Duration::from_millis(300),
        idle_timeout: Duration::from_secs(5),
        event_buffer: 1024,
        snapshot_ttl: Duration::from_secs(60),
        snapshot_capacity: 16,
    }
}

pub fn registry_with(extractor: impl Extractor + 'static) -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register(Arc::new(extractor));
    registry
}

pub fn manager_with(extractor: impl Extractor + 'static) -> SessionManager {
    SessionManager::new(registry_with(extractor), test_settings())
}

/// Next event, or `None` once the stream is closed
pub async fn next_event(events: &mut mpsc::Receiver<ProgressEvent>) -> Option<ProgressEvent> {
    tokio::time::timeout(PATIENCE, events.recv())
        .await
        .expect("timed out waiting for a session event")
}

/// Read until the stream closes
pub async fn collect(events: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut seen = Vec::new();
    while let Some(event) = next_event(events).await {
        seen.push(event);
    }
    seen
}

/// Read until `matches` accepts an event; returns everything read
pub async fn read_until(
    events: &mut mpsc::Receiver<ProgressEvent>,
    matches: impl Fn(&ProgressEvent) -> bool,
) -> Vec<ProgressEvent> {
    let mut seen = Vec::new();
    while let Some(event) = next_event(events).await {
        let done = matches(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
    panic!("stream closed before the expected event; saw {:?}", types(&seen));
}

/// Everything that arrives within `window`
pub async fn drain_for(
    events: &mut mpsc::Receiver<ProgressEvent>,
    window: Duration,
) -> Vec<ProgressEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        seen.push(event);
    }
    seen
}

/// Wire tags of `events`, in order
pub fn types(events: &[ProgressEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type()).collect()
}

/// Wire tags without progress ticks
pub fn milestones(events: &[ProgressEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter(|e| !e.is_lossy())
        .map(|e| e.event_type())
        .collect()
}

pub fn count_records(events: &[ProgressEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::RecordReady { .. }))
        .count()
}

/// Poll until no session is registered
pub async fn wait_until_idle(manager: &SessionManager) {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while manager.active_count().await > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "sessions still active after {:?}",
            PATIENCE
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
