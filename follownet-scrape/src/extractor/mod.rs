//! Platform extractors
//!
//! An extractor turns a source URL into a lazy stream of `ExtractorItem`s.
//! It must call `ControlToken::checkpoint` before each network fetch and
//! before producing each record, and end its stream once told to stop.
//! Per-entity failures are reported as `Skipped` items; an `Err` item is
//! fatal and ends the session.

pub mod github;

use std::collections::HashMap;
use std::sync::Arc;

use follownet_common::config::GitHubConfig;
use follownet_common::{Platform, Record};
use futures::stream::BoxStream;
use thiserror::Error;

use crate::session::ControlToken;

pub use github::GitHubExtractor;

/// Parameters for one extraction run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub url: String,
    /// 1-based starting page
    pub page: u32,
    /// Maximum number of records the session will accept
    pub limit: usize,
}

/// One step of an extraction run
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorItem {
    /// Number of entities the extractor expects to visit
    Total(usize),
    /// Stage change with a human-readable message
    Stage { stage: u32, message: String },
    /// About to fetch this entity
    Visiting(String),
    /// One extracted record
    Record(Record),
    /// Entity could not be extracted; extraction continues
    Skipped { entity: String, reason: String },
}

/// Fatal extraction failure
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unrecognized source URL: {0}")]
    UnrecognizedUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Fatal(String),
}

pub type ExtractorStream = BoxStream<'static, Result<ExtractorItem, ExtractionError>>;

/// Platform-specific record producer
pub trait Extractor: Send + Sync {
    /// Platform this extractor serves
    fn platform(&self) -> Platform;

    /// Start a lazy extraction run
    ///
    /// Nothing happens until the returned stream is polled. Dropping the
    /// stream releases every resource the run holds.
    fn run(&self, request: ExtractionRequest, control: ControlToken) -> ExtractorStream;
}

/// Extractors keyed by the platform they serve
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<Platform, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extractor
    pub fn with_defaults(github: &GitHubConfig) -> Result<Self, ExtractionError> {
        let mut registry = Self::new();
        registry.register(Arc::new(GitHubExtractor::new(github)?));
        Ok(registry)
    }

    /// Add or replace the extractor for its platform
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(extractor.platform(), extractor);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(&platform).cloned()
    }

    /// Platforms with a registered extractor
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<_> = self.extractors.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}
