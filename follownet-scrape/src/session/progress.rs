//! Progress accounting for one session

use follownet_common::ProgressFields;
use serde::Serialize;

/// Counters behind every progress-bearing event
///
/// `processed` counts every entity the extractor visited, including skipped
/// and duplicate ones. The percentage never decreases and never exceeds 100.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressTracker {
    limit: usize,
    reported_total: Option<usize>,
    processed: usize,
    percent: f64,
    stage: Option<u32>,
    current: Option<String>,
}

impl ProgressTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Expected entity count, bounded by the session limit
    pub fn total(&self) -> usize {
        self.reported_total.map_or(self.limit, |n| n.min(self.limit))
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn set_reported_total(&mut self, total: usize) {
        self.reported_total = Some(total);
        self.recompute();
    }

    pub fn set_stage(&mut self, stage: u32) {
        self.stage = Some(stage);
    }

    /// Entity currently being fetched
    pub fn set_current(&mut self, entity: impl Into<String>) {
        self.current = Some(entity.into());
    }

    /// One more entity visited
    pub fn visit(&mut self, entity: impl Into<String>) {
        self.current = Some(entity.into());
        self.processed += 1;
        self.recompute();
    }

    /// Mark the run as finished
    pub fn finish(&mut self) {
        self.percent = 100.0;
    }

    fn recompute(&mut self) {
        let total = self.total();
        if total == 0 {
            return;
        }
        let raw = (self.processed as f64 / total as f64 * 100.0).min(100.0);
        self.percent = self.percent.max(raw);
    }

    /// Wire fields for the next event
    pub fn fields(&self) -> ProgressFields {
        ProgressFields {
            progress: Some((self.percent * 10.0).round() / 10.0),
            stage: self.stage,
            current_user: self.current.clone(),
            processed_count: Some(self.processed),
            total_count: Some(self.total()),
        }
    }
}
