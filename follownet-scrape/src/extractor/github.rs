//! GitHub follower/stargazer extractor
//!
//! Two stages: collect usernames from the followers (or following, or
//! stargazers) list pages, then fetch each user's profile page and parse it
//! into a `Record`. A failure to load the first list page is fatal; a failed
//! profile page only skips that user.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use follownet_common::config::GitHubConfig;
use follownet_common::{Platform, Record, RecordKind};
use futures::Stream;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::{ExtractionError, ExtractionRequest, Extractor, ExtractorItem, ExtractorStream};
use crate::session::{Checkpoint, ControlToken};

/// Users GitHub lists per followers/stargazers page
pub const USERS_PER_PAGE: usize = 50;

/// First path segments that never name a user
const RESERVED_PATHS: &[&str] = &[
    "about", "explore", "features", "login", "marketplace", "notifications", "orgs",
    "pricing", "search", "settings", "sponsors", "topics", "trending",
];

/// What a GitHub URL asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubTarget {
    Followers { user: String },
    Following { user: String },
    Stargazers { owner: String, repo: String },
}

impl GitHubTarget {
    /// Interpret a github.com URL
    ///
    /// `/<user>` and `/<user>?tab=followers` list followers,
    /// `/<user>?tab=following` lists followed accounts and
    /// `/<owner>/<repo>[/stargazers]` lists stargazers.
    pub fn parse(url: &str) -> Result<Self, ExtractionError> {
        let parsed =
            Url::parse(url.trim()).map_err(|_| ExtractionError::UnrecognizedUrl(url.to_string()))?;
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let tab = parsed
            .query_pairs()
            .find(|(k, _)| k == "tab")
            .map(|(_, v)| v.into_owned());

        match segments.as_slice() {
            [user] if !RESERVED_PATHS.contains(&user.to_ascii_lowercase().as_str()) => {
                match tab.as_deref() {
                    Some("following") => Ok(GitHubTarget::Following {
                        user: user.to_string(),
                    }),
                    None | Some("followers") | Some("") => Ok(GitHubTarget::Followers {
                        user: user.to_string(),
                    }),
                    Some(_) => Err(ExtractionError::UnrecognizedUrl(url.to_string())),
                }
            }
            [owner, repo] | [owner, repo, "stargazers"]
                if !RESERVED_PATHS.contains(&owner.to_ascii_lowercase().as_str()) =>
            {
                Ok(GitHubTarget::Stargazers {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(ExtractionError::UnrecognizedUrl(url.to_string())),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            GitHubTarget::Followers { .. } => RecordKind::Follower,
            GitHubTarget::Following { .. } => RecordKind::Following,
            GitHubTarget::Stargazers { .. } => RecordKind::Stargazer,
        }
    }

    /// `user` or `owner/repo`
    pub fn label(&self) -> String {
        match self {
            GitHubTarget::Followers { user } | GitHubTarget::Following { user } => user.clone(),
            GitHubTarget::Stargazers { owner, repo } => format!("{}/{}", owner, repo),
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            GitHubTarget::Followers { .. } => "followers",
            GitHubTarget::Following { .. } => "followed accounts",
            GitHubTarget::Stargazers { .. } => "stargazers",
        }
    }

    /// Account whose own links must not be mistaken for list entries
    fn owner(&self) -> &str {
        match self {
            GitHubTarget::Followers { user } | GitHubTarget::Following { user } => user,
            GitHubTarget::Stargazers { owner, .. } => owner,
        }
    }

    fn list_url(&self, base: &str, page: u32) -> String {
        match self {
            GitHubTarget::Followers { user } => {
                format!("{}/{}?tab=followers&page={}", base, user, page)
            }
            GitHubTarget::Following { user } => {
                format!("{}/{}?tab=following&page={}", base, user, page)
            }
            GitHubTarget::Stargazers { owner, repo } => {
                format!("{}/{}/{}/stargazers?page={}", base, owner, repo, page)
            }
        }
    }
}

/// Number of list pages needed for `limit` users, capped at `max_pages`
pub fn pages_for(limit: usize, max_pages: u32) -> u32 {
    let needed = limit.div_ceil(USERS_PER_PAGE).max(1);
    (needed.min(max_pages as usize) as u32).max(1)
}

/// Last list page to fetch when starting at `first_page`
pub fn last_list_page(first_page: u32, limit: usize, max_pages: u32) -> u32 {
    first_page.saturating_add(pages_for(limit, max_pages) - 1)
}

/// Parse GitHub's abbreviated counters: `1,234`, `1.2k`, `3m`
pub fn parse_count(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect::<String>()
        .to_ascii_lowercase();
    let (number, multiplier) = match cleaned.chars().last()? {
        'k' => (&cleaned[..cleaned.len() - 1], 1_000.0),
        'm' => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// CSS selectors for list and profile pages
#[derive(Debug)]
struct PageSelectors {
    user_link: Selector,
    display_name: Vec<Selector>,
    bio: Vec<Selector>,
    avatar: Selector,
    profile_links: Selector,
    any_link: Selector,
    counter_value: Selector,
    company: Vec<Selector>,
    location: Vec<Selector>,
    email: Selector,
    website: Vec<Selector>,
    social: Selector,
    repositories: Selector,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn selectors(css: &[&str]) -> Vec<Selector> {
    css.iter().map(|s| selector(s)).collect()
}

impl PageSelectors {
    fn new() -> Self {
        Self {
            user_link: selector(r#"a[data-hovercard-type="user"]"#),
            display_name: selectors(&["h1.vcard-names .p-name", ".vcard-fullname"]),
            bio: selectors(&[".p-note .user-profile-bio", ".user-profile-bio"]),
            avatar: selector("img.avatar-user"),
            profile_links: selector(".js-profile-editable-area a"),
            any_link: selector("a[href]"),
            counter_value: selector("span.text-bold"),
            company: selectors(&[
                r#"[data-test-selector="profile-company"] .p-org"#,
                r#".vcard-detail[itemprop="worksFor"] .p-org"#,
                ".vcard-detail .p-org",
            ]),
            location: selectors(&[
                r#"[data-test-selector="profile-location"] .p-label"#,
                r#".vcard-detail[itemprop="homeLocation"] .p-label"#,
                ".vcard-detail .p-label",
            ]),
            email: selector(r#"li[itemprop="email"]"#),
            website: selectors(&[
                r#"[data-test-selector="profile-website"] .Link--primary"#,
                r#"li[itemprop="url"] a"#,
            ]),
            social: selector(r#"li[itemprop="social"] a"#),
            repositories: selector(r#"a[href$="?tab=repositories"] .Counter"#),
        }
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn first_text(document: &Html, candidates: &[Selector]) -> Option<String> {
    candidates
        .iter()
        .flat_map(|sel| document.select(sel))
        .map(text_of)
        .find(|text| !text.is_empty())
}

fn first_href(document: &Html, candidates: &[Selector]) -> Option<String> {
    candidates
        .iter()
        .flat_map(|sel| document.select(sel))
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

/// Username named by a user link, if the link points at a profile
fn username_from_href(href: &str) -> Option<String> {
    let path = if href.starts_with('/') {
        href.to_string()
    } else {
        Url::parse(href).ok()?.path().to_string()
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let name = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    Some(name.to_string())
}

/// GitHub list/profile scraper
#[derive(Debug, Clone)]
pub struct GitHubExtractor {
    client: reqwest::Client,
    base_url: String,
    max_pages: u32,
    request_delay: Duration,
    selectors: Arc<PageSelectors>,
}

impl GitHubExtractor {
    pub fn new(config: &GitHubConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_pages: config.max_pages.max(1),
            request_delay: Duration::from_millis(config.request_delay_ms),
            selectors: Arc::new(PageSelectors::new()),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, ExtractionError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn pace(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// Usernames on one list page, in page order, without the list owner
    fn parse_user_links(&self, html: &str, owner: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        document
            .select(&self.selectors.user_link)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(username_from_href)
            .filter(|name| !name.eq_ignore_ascii_case(owner))
            .filter(|name| seen.insert(name.to_ascii_lowercase()))
            .take(USERS_PER_PAGE)
            .collect()
    }

    /// Build a record from a profile page
    fn parse_profile(&self, html: &str, username: &str, kind: RecordKind, source: &str) -> Record {
        let document = Html::parse_document(html);
        let sel = &self.selectors;
        let mut record = Record::new(Platform::GitHub, kind, username);
        record.profile_url = format!("{}/{}", self.base_url, username);

        if let Some(name) = first_text(&document, &sel.display_name) {
            record.display_name = name;
        }
        if let Some(bio) = first_text(&document, &sel.bio) {
            record.bio = bio;
        }
        record.avatar_url = document
            .select(&sel.avatar)
            .filter_map(|el| el.value().attr("src"))
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/{}.png", self.base_url, username));

        let (followers, following) = self.social_counts(&document);
        record.follower_count = followers;
        record.following_count = following;

        if let Some(company) = first_text(&document, &sel.company) {
            record.company = company;
        }
        if let Some(location) = first_text(&document, &sel.location) {
            record.location = location;
        }
        if let Some(website) = first_href(&document, &sel.website) {
            record.website = website;
        }
        if let Some(email) = document
            .select(&sel.email)
            .filter_map(|el| el.value().attr("aria-label"))
            .filter_map(|label| label.split_once("Email:"))
            .map(|(_, email)| email.trim())
            .find(|email| email.contains('@'))
        {
            record.email = email.to_string();
        }
        if let Some(handle) = document
            .select(&sel.social)
            .filter_map(|el| el.value().attr("href"))
            .filter(|href| href.contains("twitter.com/") || href.contains("x.com/"))
            .filter_map(username_from_href)
            .next()
        {
            record.twitter = format!("@{}", handle);
        }
        if let Some(repos) = document
            .select(&sel.repositories)
            .map(text_of)
            .find_map(|text| parse_count(&text))
        {
            record.push_info("public_repos", repos.to_string());
        }
        record.push_info("source", source);
        record
    }

    /// Follower and following counts from the profile sidebar
    fn social_counts(&self, document: &Html) -> (Option<u64>, Option<u64>) {
        let sel = &self.selectors;
        let count_in = |link: ElementRef<'_>| {
            link.select(&sel.counter_value)
                .map(text_of)
                .find_map(|text| parse_count(&text))
                .or_else(|| {
                    text_of(link)
                        .split_whitespace()
                        .find_map(parse_count)
                })
        };

        let mut followers = None;
        let mut following = None;
        let sidebar = document.select(&sel.profile_links);
        let anywhere = document.select(&sel.any_link);
        for link in sidebar.chain(anywhere) {
            if followers.is_some() && following.is_some() {
                break;
            }
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if followers.is_none() && href.contains("followers") {
                followers = count_in(link);
            } else if following.is_none() && href.contains("following") {
                following = count_in(link);
            }
        }
        (followers, following)
    }

    fn extract(
        self,
        request: ExtractionRequest,
        mut control: ControlToken,
    ) -> impl Stream<Item = Result<ExtractorItem, ExtractionError>> + Send + 'static {
        let this = self;
        try_stream! {
            let target = GitHubTarget::parse(&request.url)?;
            let label = target.label();
            let first_page = request.page.max(1);
            let last_page = last_list_page(first_page, request.limit, this.max_pages);

            yield ExtractorItem::Stage {
                stage: 1,
                message: format!("Collecting {} of {}", target.noun(), label),
            };

            let mut usernames: Vec<String> = Vec::new();
            let mut seen = HashSet::new();
            let mut stopped = false;

            for page in first_page..=last_page {
                if usernames.len() >= request.limit {
                    break;
                }
                if control.checkpoint().await == Checkpoint::Stop {
                    stopped = true;
                    break;
                }
                let url = target.list_url(&this.base_url, page);
                let html = match this.fetch(&url).await {
                    Ok(html) => html,
                    Err(e) if page == first_page => Err::<String, _>(ExtractionError::Fatal(
                        format!("Could not load {} of {}: {}", target.noun(), label, e),
                    ))?,
                    Err(e) => {
                        warn!("GitHub list page {} failed, keeping earlier pages: {}", page, e);
                        break;
                    }
                };
                let names = this.parse_user_links(&html, target.owner());
                if names.is_empty() {
                    debug!("GitHub list page {} is empty", page);
                    break;
                }
                for name in names {
                    if seen.insert(name.to_ascii_lowercase()) {
                        usernames.push(name);
                    }
                }
                yield ExtractorItem::Stage {
                    stage: 1,
                    message: format!("Page {}: {} accounts found", page, usernames.len()),
                };
                if page < last_page {
                    this.pace().await;
                }
            }

            if !stopped {
                usernames.truncate(request.limit);
                yield ExtractorItem::Total(usernames.len());
                yield ExtractorItem::Stage {
                    stage: 2,
                    message: format!("Fetching {} profiles", usernames.len()),
                };

                let kind = target.kind();
                for username in usernames {
                    if control.checkpoint().await == Checkpoint::Stop {
                        break;
                    }
                    yield ExtractorItem::Visiting(username.clone());

                    let url = format!("{}/{}", this.base_url, username);
                    match this.fetch(&url).await {
                        Ok(html) => {
                            let record = this.parse_profile(&html, &username, kind, &label);
                            yield ExtractorItem::Record(record);
                        }
                        Err(e) => {
                            yield ExtractorItem::Skipped {
                                entity: username,
                                reason: e.to_string(),
                            };
                        }
                    }
                    if control.is_stopping() {
                        break;
                    }
                    this.pace().await;
                }
            }
        }
    }
}

impl Extractor for GitHubExtractor {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn run(&self, request: ExtractionRequest, control: ControlToken) -> ExtractorStream {
        Box::pin(self.clone().extract(request, control))
    }
}
