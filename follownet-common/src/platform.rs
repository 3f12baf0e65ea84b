//! Platform resolution
//!
//! Maps a source URL onto one of the supported platforms. Matching is done on
//! the URL host against a fixed, ordered domain table; the first entry whose
//! domain equals the host or is a parent domain of it wins.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Supported source platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    GitHub,
    Twitter,
    ProductHunt,
    Weibo,
    HackerNews,
    YouTube,
    Reddit,
    Medium,
    Bilibili,
}

/// Ordered domain table. No domain is a suffix of another, so order only
/// matters for readability.
const PLATFORM_DOMAINS: &[(&str, Platform)] = &[
    ("github.com", Platform::GitHub),
    ("twitter.com", Platform::Twitter),
    ("x.com", Platform::Twitter),
    ("producthunt.com", Platform::ProductHunt),
    ("weibo.com", Platform::Weibo),
    ("news.ycombinator.com", Platform::HackerNews),
    ("youtube.com", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
    ("reddit.com", Platform::Reddit),
    ("medium.com", Platform::Medium),
    ("bilibili.com", Platform::Bilibili),
];

impl Platform {
    /// Wire tag, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GitHub => "github",
            Platform::Twitter => "twitter",
            Platform::ProductHunt => "producthunt",
            Platform::Weibo => "weibo",
            Platform::HackerNews => "hackernews",
            Platform::YouTube => "youtube",
            Platform::Reddit => "reddit",
            Platform::Medium => "medium",
            Platform::Bilibili => "bilibili",
        }
    }

    /// Human-readable platform name for event messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::GitHub => "GitHub",
            Platform::Twitter => "Twitter",
            Platform::ProductHunt => "Product Hunt",
            Platform::Weibo => "Weibo",
            Platform::HackerNews => "Hacker News",
            Platform::YouTube => "YouTube",
            Platform::Reddit => "Reddit",
            Platform::Medium => "Medium",
            Platform::Bilibili => "Bilibili",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a source URL to its platform.
///
/// Returns `None` for unparseable URLs, URLs without a host, and hosts not
/// present in the domain table. Pure and deterministic.
pub fn resolve(url: &str) -> Option<Platform> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.trim_end_matches('.');

    PLATFORM_DOMAINS
        .iter()
        .find(|(domain, _)| host_matches(host, domain))
        .map(|(_, platform)| *platform)
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
