//! GitHub extractor against a mock GitHub
//!
//! List and profile pages are served by wiremock; the extractor is driven
//! both directly and through a full session.

mod helpers;

use follownet_common::config::GitHubConfig;
use follownet_common::{ControlSignal, ErrorKind, ProgressEvent, RecordKind};
use follownet_scrape::extractor::{
    ExtractionRequest, Extractor, ExtractorItem, ExtractorRegistry, GitHubExtractor,
};
use follownet_scrape::session::{ControlHandle, SessionManager, SessionRequest};
use futures::StreamExt;
use helpers::*;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> GitHubConfig {
    GitHubConfig {
        base_url: server.uri(),
        request_delay_ms: 0,
        ..GitHubConfig::default()
    }
}

fn list_page(users: &[&str]) -> String {
    let links: String = users
        .iter()
        .map(|u| format!(r#"<a data-hovercard-type="user" href="/{u}">{u}</a>"#))
        .collect();
    format!("<html><body>{}</body></html>", links)
}

fn profile_page(name: &str, followers: &str) -> String {
    format!(
        r#"<html><body>
             <h1 class="vcard-names"><span class="p-name">{name}</span></h1>
             <div class="js-profile-editable-area">
               <a href="/x?tab=followers"><span class="text-bold">{followers}</span> followers</a>
               <a href="/x?tab=following"><span class="text-bold">3</span> following</a>
             </div>
           </body></html>"#
    )
}

async fn mount_list(server: &MockServer, list_path: &str, page: &str, users: &[&str]) {
    Mock::given(method("GET"))
        .and(path(list_path))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_page(users)))
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer, user: &str, name: &str, followers: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", user)))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_page(name, followers)))
        .mount(server)
        .await;
}

async fn run_direct(
    extractor: &GitHubExtractor,
    url: &str,
    limit: usize,
    control: &ControlHandle,
) -> Vec<ExtractorItem> {
    let request = ExtractionRequest {
        url: url.to_string(),
        page: 1,
        limit,
    };
    let mut stream = extractor.run(request, control.token());
    let mut items = Vec::new();
    while let Some(item) = tokio::time::timeout(PATIENCE, stream.next())
        .await
        .expect("extractor stalled")
    {
        items.push(item.expect("extraction failed"));
    }
    items
}

fn records(items: &[ExtractorItem]) -> Vec<&follownet_common::Record> {
    items
        .iter()
        .filter_map(|item| match item {
            ExtractorItem::Record(record) => Some(record),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn followers_are_listed_then_profiled() {
    // Given: two followers, one with a missing profile
    let server = MockServer::start().await;
    mount_list(&server, "/octocat", "1", &["octocat", "alice", "bob"]).await;
    mount_profile(&server, "alice", "Alice Liddell", "1.5k").await;

    let extractor = GitHubExtractor::new(&config(&server)).unwrap();
    let (control, _acks) = ControlHandle::new();

    // When: extracting followers
    let items = run_direct(&extractor, "https://github.com/octocat", 10, &control).await;

    // Then: alice becomes a record, bob is skipped
    assert!(items
        .iter()
        .any(|item| matches!(item, ExtractorItem::Total(2))));
    let found = records(&items);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "alice");
    assert_eq!(found[0].display_name, "Alice Liddell");
    assert_eq!(found[0].follower_count, Some(1500));
    assert_eq!(found[0].following_count, Some(3));
    assert_eq!(found[0].kind, RecordKind::Follower);
    assert_eq!(found[0].profile_url, format!("{}/alice", server.uri()));

    assert!(items.iter().any(|item| matches!(
        item,
        ExtractorItem::Skipped { entity, .. } if entity == "bob"
    )));
}

#[tokio::test]
async fn stargazers_are_extracted() {
    let server = MockServer::start().await;
    mount_list(&server, "/acme/widget/stargazers", "1", &["carol"]).await;
    mount_profile(&server, "carol", "Carol", "12").await;

    let extractor = GitHubExtractor::new(&config(&server)).unwrap();
    let (control, _acks) = ControlHandle::new();
    let items = run_direct(&extractor, "https://github.com/acme/widget", 10, &control).await;

    let found = records(&items);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, RecordKind::Stargazer);
    assert_eq!(found[0].follower_count, Some(12));
    assert!(found[0].additional_info.contains("source: acme/widget"));
}

#[tokio::test]
async fn limit_truncates_the_list() {
    // Given: more users on page one than requested
    let server = MockServer::start().await;
    mount_list(&server, "/octocat", "1", &["a1", "a2", "a3"]).await;
    mount_profile(&server, "a1", "A1", "1").await;
    mount_profile(&server, "a2", "A2", "2").await;
    Mock::given(method("GET"))
        .and(path("/a3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_page("A3", "3")))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/octocat"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(list_page(&["b1"])))
        .expect(0)
        .mount(&server)
        .await;

    let extractor = GitHubExtractor::new(&config(&server)).unwrap();
    let (control, _acks) = ControlHandle::new();

    // When: limit is two
    let items = run_direct(&extractor, "https://github.com/octocat", 2, &control).await;

    // Then: only two profiles are fetched
    let names: Vec<_> = records(&items).iter().map(|r| r.username.clone()).collect();
    assert_eq!(names, ["a1", "a2"]);
}

#[tokio::test]
async fn stop_before_listing_yields_no_records() {
    let server = MockServer::start().await;
    mount_list(&server, "/octocat", "1", &["alice"]).await;
    mount_profile(&server, "alice", "Alice", "1").await;

    let extractor = GitHubExtractor::new(&config(&server)).unwrap();
    let (control, _acks) = ControlHandle::new();
    assert!(control.request(ControlSignal::Stop).accepted);

    let items = run_direct(&extractor, "https://github.com/octocat", 10, &control).await;

    assert!(records(&items).is_empty());
    assert!(!items
        .iter()
        .any(|item| matches!(item, ExtractorItem::Total(_))));
}

#[tokio::test]
async fn unreachable_first_page_is_fatal() {
    // Given: a GitHub that answers 404 for everything
    let server = MockServer::start().await;
    let extractor = GitHubExtractor::new(&config(&server)).unwrap();
    let (control, _acks) = ControlHandle::new();

    // When: the stream is polled
    let request = ExtractionRequest {
        url: "https://github.com/octocat".to_string(),
        page: 1,
        limit: 10,
    };
    let results: Vec<_> = extractor.run(request, control.token()).collect().await;

    // Then: it ends with an error
    assert!(matches!(results.last(), Some(Err(_))));
    assert!(results.iter().all(|r| !matches!(r, Ok(ExtractorItem::Record(_)))));
}

#[tokio::test]
async fn session_over_mock_github_completes() {
    let server = MockServer::start().await;
    mount_list(&server, "/octocat", "1", &["alice", "bob"]).await;
    mount_profile(&server, "alice", "Alice", "10").await;
    mount_profile(&server, "bob", "Bob", "20").await;

    let registry = ExtractorRegistry::with_defaults(&config(&server)).unwrap();
    let manager = SessionManager::new(registry, test_settings());

    let mut stream = manager
        .create(SessionRequest::new("https://github.com/octocat").with_limit(5))
        .await;
    let events = collect(&mut stream.events).await;

    assert_eq!(
        milestones(&events),
        ["start", "platform", "user_completed", "user_completed", "complete"]
    );
    match events.last().unwrap() {
        ProgressEvent::Completed { data, total, .. } => {
            assert_eq!(*total, 2);
            assert_eq!(data[0].display_name, "Alice");
            assert_eq!(data[1].follower_count, Some(20));
        }
        other => panic!("expected complete, got {:?}", other),
    }
}

#[tokio::test]
async fn session_with_missing_account_fails() {
    let server = MockServer::start().await;
    let registry = ExtractorRegistry::with_defaults(&config(&server)).unwrap();
    let manager = SessionManager::new(registry, test_settings());

    let mut stream = manager
        .create(SessionRequest::new("https://github.com/nobody"))
        .await;
    let events = collect(&mut stream.events).await;

    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    match events.last().unwrap() {
        ProgressEvent::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::FatalExtraction);
            assert!(message.contains("nobody"), "{}", message);
        }
        other => panic!("expected error, got {:?}", other),
    }
}
