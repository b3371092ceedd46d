//! Router-level tests driving the full middleware stack with fake upstreams.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use starboard::auth::IdentityProvider;
use starboard::config::Cors;
use starboard::db::Database;
use starboard::error::{AuthError, SearchError};
use starboard::github::{RepositorySearch, SearchPage, SearchQuery};
use starboard::handler::AppState;
use starboard::model::{Owner, RepositorySummary};
use starboard::{app, cors_layer};

const ALICE: &str = "token-alice";
const BOB: &str = "token-bob";

struct StaticIdentity {
    calls: AtomicUsize,
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match token {
            ALICE => Ok("user_alice".to_string()),
            BOB => Ok("user_bob".to_string()),
            _ => Err(AuthError::Rejected("unknown token".to_string())),
        }
    }
}

enum Upstream {
    Page(SearchPage),
    RateLimited,
    Failed(&'static str),
}

struct FakeSearch {
    calls: AtomicUsize,
    upstream: Upstream,
}

#[async_trait]
impl RepositorySearch for FakeSearch {
    async fn search(&self, _query: &SearchQuery) -> Result<SearchPage, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.upstream {
            Upstream::Page(page) => Ok(page.clone()),
            Upstream::RateLimited => Err(SearchError::RateLimited),
            Upstream::Failed(msg) => Err(SearchError::Failed(msg.to_string())),
        }
    }
}

struct TestApp {
    router: Router,
    db: Arc<Database>,
    search: Arc<FakeSearch>,
    identity: Arc<StaticIdentity>,
}

fn summary(id: i64, owner: &str, name: &str) -> RepositorySummary {
    RepositorySummary {
        id,
        name: name.to_string(),
        full_name: format!("{owner}/{name}"),
        description: None,
        html_url: format!("https://github.com/{owner}/{name}"),
        stargazers_count: 1000 - id,
        forks_count: 0,
        language: Some("Rust".to_string()),
        owner: Owner {
            login: owner.to_string(),
            avatar_url: None,
        },
        updated_at: None,
        is_starred: false,
    }
}

fn default_page() -> SearchPage {
    SearchPage {
        total_count: 3,
        items: vec![
            summary(1, "facebook", "react"),
            summary(2, "preactjs", "preact"),
            summary(3, "vercel", "next.js"),
        ],
    }
}

async fn test_app(upstream: Upstream) -> TestApp {
    let db = Arc::new(Database::in_memory().await.unwrap());
    let search = Arc::new(FakeSearch {
        calls: AtomicUsize::new(0),
        upstream,
    });
    let identity = Arc::new(StaticIdentity {
        calls: AtomicUsize::new(0),
    });

    let state = AppState {
        db: db.clone(),
        search: search.clone(),
        identity: identity.clone(),
    };
    let cors = cors_layer(&Cors {
        origins: vec!["http://localhost:3000".to_string()],
        origin_suffixes: vec![".vercel.app".to_string()],
    });

    TestApp {
        router: app(state, cors),
        db,
        search,
        identity,
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn react_star_body() -> Value {
    json!({
        "name": "react",
        "full_name": "facebook/react",
        "html_url": "https://github.com/facebook/react",
        "stargazers_count": 200000,
        "owner": { "login": "facebook" }
    })
}

fn star_body(n: usize) -> Value {
    json!({
        "name": format!("repo-{n}"),
        "full_name": format!("someone/repo-{n}"),
        "description": "a repository",
        "html_url": format!("https://github.com/someone/repo-{n}"),
        "stargazers_count": n,
        "language": "Rust",
        "owner": { "login": "someone" }
    })
}

#[tokio::test]
async fn public_routes_need_no_token() {
    let app = test_app(Upstream::Page(default_page())).await;

    let (status, body) = send(&app, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Server is running!" }));

    let (status, body) = send(&app, get("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert!(body["endpoints"]["search"].is_string());

    assert_eq!(app.identity.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn protected_routes_reject_missing_or_invalid_tokens() {
    let app = test_app(Upstream::Page(default_page())).await;

    let requests = vec![
        post("/api/search", None, json!({ "keyword": "react" })),
        post("/api/search", Some("forged"), json!({ "keyword": "react" })),
        post("/api/repositories/star", None, react_star_body()),
        get("/api/repositories", None),
        get("/api/repositories/check/https%3A%2F%2Fgithub.com%2Ffacebook%2Freact", Some("forged")),
    ];

    for req in requests {
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
        assert!(body["details"].is_string());
    }

    assert_eq!(app.search.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.db.count_starred("user_alice").await.unwrap(), 0);
}

#[tokio::test]
async fn search_without_keyword_is_rejected_before_upstream() {
    let app = test_app(Upstream::Page(default_page())).await;

    for body in [json!({}), json!({ "keyword": "" }), json!({ "keyword": "   ", "page": 2 })] {
        let (status, body) = send(&app, post("/api/search", Some(ALICE), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Keyword is required");
    }

    assert_eq!(app.search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_marks_only_the_callers_starred_results() {
    let app = test_app(Upstream::Page(default_page())).await;

    let (status, _) = send(&app, post("/api/repositories/star", Some(ALICE), react_star_body())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, post("/api/search", Some(ALICE), json!({ "keyword": "react" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keyword"], "react");
    assert_eq!(body["totalCount"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["perPage"], 10);

    let repos = body["repositories"].as_array().unwrap();
    assert_eq!(repos.len(), 3);
    for repo in repos {
        let expected = repo["html_url"] == "https://github.com/facebook/react";
        assert_eq!(repo["isStarred"], expected, "{}", repo["html_url"]);
    }

    // Bob never starred anything.
    let (_, body) = send(&app, post("/api/search", Some(BOB), json!({ "keyword": "react", "page": 2, "perPage": 5 }))).await;
    assert_eq!(body["page"], 2);
    assert_eq!(body["perPage"], 5);
    assert!(body["repositories"].as_array().unwrap().iter().all(|r| r["isStarred"] == false));
}

#[tokio::test]
async fn upstream_rate_limit_maps_to_forbidden() {
    let app = test_app(Upstream::RateLimited).await;

    let (status, body) = send(&app, post("/api/search", Some(ALICE), json!({ "keyword": "react" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "GitHub API rate limit exceeded. Please try again later.");
    assert_eq!(app.search.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn other_upstream_failures_map_to_server_error() {
    let app = test_app(Upstream::Failed("Validation Failed")).await;

    let (status, body) = send(&app, post("/api/search", Some(ALICE), json!({ "keyword": "react" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to search repositories");
    assert_eq!(body["details"], "Validation Failed");
}

#[tokio::test]
async fn starring_twice_toggles_back() {
    let app = test_app(Upstream::Page(default_page())).await;

    let (status, body) = send(&app, post("/api/repositories/star", Some(ALICE), react_star_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Repository starred");
    assert_eq!(body["starred"], true);
    assert_eq!(body["repository"]["userId"], "user_alice");
    assert_eq!(body["repository"]["fullName"], "facebook/react");
    assert_eq!(body["repository"]["url"], "https://github.com/facebook/react");
    assert_eq!(body["repository"]["starCount"], 200000);
    assert_eq!(body["repository"]["owner"], "facebook");
    assert!(body["repository"]["starredAt"].is_string());

    let (status, body) = send(&app, post("/api/repositories/star", Some(ALICE), react_star_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Repository unstarred", "starred": false }));

    assert_eq!(app.db.count_starred("user_alice").await.unwrap(), 0);
}

#[tokio::test]
async fn stars_are_scoped_per_user() {
    let app = test_app(Upstream::Page(default_page())).await;

    send(&app, post("/api/repositories/star", Some(ALICE), react_star_body())).await;
    let (status, _) = send(&app, post("/api/repositories/star", Some(BOB), react_star_body())).await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(app.db.count_starred("user_alice").await.unwrap(), 1);
    assert_eq!(app.db.count_starred("user_bob").await.unwrap(), 1);
}

#[tokio::test]
async fn check_reports_decoded_url_membership() {
    let app = test_app(Upstream::Page(default_page())).await;
    send(&app, post("/api/repositories/star", Some(ALICE), react_star_body())).await;

    let encoded = urlencoding::encode("https://github.com/facebook/react");
    let (status, body) = send(&app, get(&format!("/api/repositories/check/{encoded}"), Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "starred": true }));

    let (_, body) = send(&app, get(&format!("/api/repositories/check/{encoded}"), Some(BOB))).await;
    assert_eq!(body, json!({ "starred": false }));

    let other = urlencoding::encode("https://github.com/preactjs/preact");
    let (_, body) = send(&app, get(&format!("/api/repositories/check/{other}"), Some(ALICE))).await;
    assert_eq!(body, json!({ "starred": false }));
}

#[tokio::test]
async fn list_paginates_newest_first() {
    let app = test_app(Upstream::Page(default_page())).await;
    for n in 0..45 {
        let (status, _) = send(&app, post("/api/repositories/star", Some(ALICE), star_body(n))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, get("/api/repositories", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"], json!({ "page": 1, "limit": 20, "total": 45, "pages": 3 }));
    let repos = body["repositories"].as_array().unwrap();
    assert_eq!(repos.len(), 20);
    assert_eq!(repos[0]["url"], "https://github.com/someone/repo-44");
    assert_eq!(repos[19]["url"], "https://github.com/someone/repo-25");

    let (_, body) = send(&app, get("/api/repositories?page=3&limit=20", Some(ALICE))).await;
    let repos = body["repositories"].as_array().unwrap();
    assert_eq!(repos.len(), 5);
    assert_eq!(repos[4]["url"], "https://github.com/someone/repo-0");

    let (_, body) = send(&app, get("/api/repositories", Some(BOB))).await;
    assert_eq!(body["pagination"], json!({ "page": 1, "limit": 20, "total": 0, "pages": 0 }));
}

#[tokio::test]
async fn cors_allows_listed_and_suffixed_origins() {
    let app = test_app(Upstream::Page(default_page())).await;

    for origin in ["http://localhost:3000", "https://starboard-preview.vercel.app"] {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            origin
        );
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/health")
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn search_without_body_is_missing_keyword() {
    let app = test_app(Upstream::Page(default_page())).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/search")
        .header(header::AUTHORIZATION, format!("Bearer {ALICE}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Keyword is required");
    assert_eq!(app.search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_bodies_are_json_bad_requests() {
    let app = test_app(Upstream::Page(default_page())).await;

    let (status, body) = send(&app, post("/api/repositories/star", Some(ALICE), json!({ "name": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("full_name"), "{body}");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/search")
        .header(header::AUTHORIZATION, format!("Bearer {ALICE}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"keyword\": "))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    assert_eq!(app.search.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.db.count_starred("user_alice").await.unwrap(), 0);
}

#[tokio::test]
async fn check_accepts_raw_slashes() {
    let app = test_app(Upstream::Page(default_page())).await;
    send(&app, post("/api/repositories/star", Some(ALICE), react_star_body())).await;

    let (status, body) = send(
        &app,
        get("/api/repositories/check/https://github.com/facebook/react", Some(ALICE)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "starred": true }));

    let (_, body) = send(
        &app,
        get("/api/repositories/check/https://github.com/facebook/react/issues", Some(ALICE)),
    )
    .await;
    assert_eq!(body, json!({ "starred": false }));
}
