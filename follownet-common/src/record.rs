//! Extracted entity records
//!
//! One `Record` per discovered account. Records are created by extractors,
//! accepted (or dropped as duplicates) by a session's accumulator and never
//! mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Role the entity plays relative to the source URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Follows the source account
    Follower,
    /// Followed by the source account
    Following,
    /// Starred the source repository
    Stargazer,
    /// Voted on the source post
    Voter,
    /// Standalone profile
    User,
}

/// Identity of a record within one session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub platform: Platform,
    pub username: String,
}

/// One extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub profile_url: String,
    pub platform: Platform,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default)]
    pub follower_count: Option<u64>,
    #[serde(default)]
    pub following_count: Option<u64>,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub website: String,
    /// Contact handle (Twitter/X username)
    #[serde(default)]
    pub twitter: String,
    #[serde(default)]
    pub email: String,
    /// Platform-specific extras flattened into `key: value; key: value`
    #[serde(default)]
    pub additional_info: String,
    pub scraped_at: DateTime<Utc>,
}

impl Record {
    /// Start a record with the identity fields set and everything else empty.
    /// `display_name` defaults to the username.
    pub fn new(platform: Platform, kind: RecordKind, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            display_name: username.clone(),
            username,
            bio: String::new(),
            avatar_url: String::new(),
            profile_url: String::new(),
            platform,
            kind,
            follower_count: None,
            following_count: None,
            company: String::new(),
            location: String::new(),
            website: String::new(),
            twitter: String::new(),
            email: String::new(),
            additional_info: String::new(),
            scraped_at: Utc::now(),
        }
    }

    /// Identity key used for in-session deduplication
    pub fn key(&self) -> RecordKey {
        RecordKey {
            platform: self.platform,
            username: self.username.clone(),
        }
    }

    /// Append a `key: value` pair to `additional_info`
    pub fn push_info(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return;
        }
        if !self.additional_info.is_empty() {
            self.additional_info.push_str("; ");
        }
        self.additional_info.push_str(key);
        self.additional_info.push_str(": ");
        self.additional_info.push_str(value);
    }
}
