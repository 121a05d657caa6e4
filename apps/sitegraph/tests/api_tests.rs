//! Integration tests for the sitegraph HTTP API.
//!
//! Uses axum-test to drive the router without starting a real server. Each
//! test gets its own redb file and include directory.

// Allow unwrap and panic in tests - these are standard for test code
// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestResponse, TestServer};
use serde_json::Value;
use sitegraph::api::{
    AppState, FaultResponse, FlushResponse, HealthResponse, RoutesResponse, SnapshotResponse,
    StatusResponse, create_router,
};
use sitegraph::config::{AppConfig, ControllerSpec};
use sitegraph::service::SiteService;
use sitegraph_core::{AccessFault, NodeId, NodeRow, NodeType, RoleId};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Mutex to serialize tests since some of them modify env vars.
static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Guard wrapper that holds the mutex and ensures cleanup on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        clear_env();
    }
}

fn clear_env() {
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe {
        std::env::remove_var("SITEGRAPH_API_KEY");
        std::env::remove_var("SITEGRAPH_RATE_LIMIT");
        std::env::remove_var("SITEGRAPH_CORS_ORIGINS");
    }
}

/// A running test server plus what it needs to stay alive.
struct Fixture {
    server: TestServer,
    service: Arc<SiteService>,
    _dir: TempDir,
    _guard: TestGuard,
}

fn spec(path: &str, body: &str) -> ControllerSpec {
    ControllerSpec {
        path: path.to_string(),
        body: Some(body.to_string()),
    }
}

fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.database = dir.path().join("site.db");
    config.storage.include_root = dir.path().join("includes");
    config.controllers = vec![
        spec("content/controllers/page", "<h1>{{name}}</h1>"),
        spec("docs/view", "doc {{id}} tab={{tab}}"),
        spec("jobs/controllers/nightly", "nightly done"),
        spec("widgets/controllers/clock", "12:00"),
    ];
    config
}

/// Site used by every test:
///
/// | id | type | alias | visible to |
/// |----|------|-------|------------|
/// | 1 | standard | - | guest, member |
/// | 2 | standard | about | guest, member |
/// | 3 | standard | members | member |
/// | 4 | external url | upstream | guest |
/// | 5 | external file | terms | guest |
/// | 6 | iframe (300) | map | guest |
/// | 7 | widget ajax | clock | guest |
/// | 8 | cron | nightly | member |
/// | 9 | standard, route `page/<:id>` | - | guest |
/// | 10 | external file (missing) | gone | guest |
fn site_rows() -> Vec<NodeRow> {
    vec![
        NodeRow::new(1, 0, NodeType::StandardPage)
            .named("Home")
            .linking("content", "page")
            .ranked(1),
        NodeRow::new(2, 0, NodeType::StandardPage)
            .named("About")
            .linking("content", "page")
            .aliased("about")
            .ranked(2),
        NodeRow::new(3, 0, NodeType::StandardPage)
            .named("Members")
            .linking("content", "page")
            .aliased("members")
            .ranked(3),
        NodeRow::new(4, 0, NodeType::ExternalUrl)
            .named("Upstream")
            .linking("", "https://example.org/")
            .aliased("upstream")
            .ranked(4),
        NodeRow::new(5, 2, NodeType::ExternalFile)
            .named("Terms")
            .linking("", "terms.html")
            .aliased("terms")
            .ranked(1),
        NodeRow::new(6, 0, NodeType::Iframe)
            .named("Map")
            .linking("", "https://maps.example.org/embed")
            .aliased("map")
            .extending(300)
            .ranked(5),
        NodeRow::new(7, 0, NodeType::WidgetAjax)
            .named("Clock")
            .linking("widgets", "clock")
            .aliased("clock")
            .ranked(6),
        NodeRow::new(8, 0, NodeType::Cron)
            .named("Nightly")
            .linking("jobs", "nightly")
            .aliased("nightly")
            .ranked(7),
        NodeRow::new(9, 0, NodeType::StandardPage)
            .named("Docs")
            .linking("docs", "view")
            .routed("page/<:id>")
            .ranked(8),
        NodeRow::new(10, 0, NodeType::ExternalFile)
            .named("Gone")
            .linking("", "missing.html")
            .aliased("gone")
            .ranked(9),
    ]
}

fn site_grants() -> Vec<(RoleId, u64)> {
    let guest = RoleId::new("guest");
    let member = RoleId::new("member");
    let mut grants: Vec<(RoleId, u64)> = [1, 2, 4, 5, 6, 7, 9, 10]
        .into_iter()
        .map(|id| (guest.clone(), id))
        .collect();
    grants.extend((1..=10).map(|id| (member.clone(), id)));
    grants
}

fn fixture_with(configure: impl FnOnce(&mut AppConfig)) -> Fixture {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("includes")).unwrap();
    std::fs::write(dir.path().join("includes/terms.html"), "<p>Terms of use</p>").unwrap();

    let mut config = test_config(&dir);
    configure(&mut config);

    let service = SiteService::open(&config).unwrap();
    service.store().import(&site_rows(), &site_grants()).unwrap();

    let state = AppState::new(service);
    let service = Arc::clone(&state.service);
    let router = create_router(state, &config);
    Fixture {
        server: TestServer::new(router).unwrap(),
        service,
        _dir: dir,
        _guard: TestGuard { _guard: guard },
    }
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

fn role_header() -> HeaderName {
    HeaderName::from_static("x-site-role")
}

fn user_header() -> HeaderName {
    HeaderName::from_static("x-site-user")
}

async fn get_as(server: &TestServer, path: &str, role: &'static str, user: Option<&'static str>) -> TestResponse {
    let mut request = server
        .get(path)
        .add_header(role_header(), HeaderValue::from_static(role));
    if let Some(user) = user {
        request = request.add_header(user_header(), HeaderValue::from_static(user));
    }
    request.await
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let f = fixture();

    let response = f.server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// SITE PAGE TESTS
// =============================================================================

#[tokio::test]
async fn test_front_page() {
    let f = fixture();

    let response = f.server.get("/").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["node"], 1);
    assert_eq!(body["action"]["action"], "controller");
    assert_eq!(body["action"]["output"], "<h1>Home</h1>");
    assert_eq!(body["action"]["path"], "content/controllers/page");
}

#[tokio::test]
async fn test_alias_and_legacy_urls_reach_same_node() {
    let f = fixture();

    let sef: Value = f.server.get("/about").await.json();
    let legacy: Value = f.server.get("/index.php?m=2").await.json();

    assert_eq!(sef["node"], 2);
    assert_eq!(sef["action"]["output"], "<h1>About</h1>");
    assert_eq!(legacy["node"], 2);
    assert_eq!(sef["action"], legacy["action"]);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let f = fixture();

    let response = f.server.get("/nowhere/at/all").await;

    response.assert_status_not_found();
    let fault: FaultResponse = response.json();
    assert_eq!(fault.status, 404);
    assert!(matches!(fault.fault, AccessFault::NotFound { .. }));
    assert!(fault.login_url.is_none());
}

#[tokio::test]
async fn test_hidden_page_anonymous_is_401_with_login() {
    let f = fixture();

    let response = f.server.get("/members").await;

    assert_eq!(response.status_code().as_u16(), 401);
    let fault: FaultResponse = response.json();
    assert_eq!(fault.fault, AccessFault::Unauthenticated { node: NodeId(3) });
    assert_eq!(
        fault.login_url.as_deref(),
        Some("http://localhost:8080/login?return=3")
    );
}

#[tokio::test]
async fn test_hidden_page_authenticated_is_403() {
    let f = fixture();

    let response = get_as(&f.server, "/members", "guest", Some("eve")).await;

    assert_eq!(response.status_code().as_u16(), 403);
    let fault: FaultResponse = response.json();
    assert_eq!(fault.fault, AccessFault::Forbidden { node: NodeId(3) });
}

#[tokio::test]
async fn test_unknown_role_headers_do_not_grow_snapshots() {
    let f = fixture();
    let held_before = f.service.held_snapshots().unwrap();

    for i in 0..40 {
        let response = f
            .server
            .get("/members")
            .add_header(
                role_header(),
                HeaderValue::from_str(&format!("bogus-{}", i)).unwrap(),
            )
            .await;
        assert_eq!(response.status_code().as_u16(), 401);
    }

    assert_eq!(f.service.held_snapshots().unwrap(), held_before);
    assert!(
        f.service
            .cache()
            .keys()
            .unwrap()
            .iter()
            .all(|key| !key.contains("bogus"))
    );
}

#[tokio::test]
async fn test_member_role_sees_member_page() {
    let f = fixture();

    let response = get_as(&f.server, "/members", "member", Some("ada")).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["action"]["output"], "<h1>Members</h1>");
}

#[tokio::test]
async fn test_external_url_redirects() {
    let f = fixture();

    let response = f.server.get("/upstream").await;

    assert_eq!(response.status_code().as_u16(), 302);
    assert_eq!(response.header(header::LOCATION), "https://example.org/");
    let body: Value = response.json();
    assert_eq!(body["action"]["action"], "redirect");
}

#[tokio::test]
async fn test_external_file_is_included_with_breadcrumbs() {
    let f = fixture();

    let response = f.server.get("/terms").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["action"]["action"], "include");
    assert_eq!(body["action"]["body"], "<p>Terms of use</p>");

    let trail: Vec<&str> = body["breadcrumbs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["name"].as_str().unwrap())
        .collect();
    assert_eq!(trail, vec!["About", "Terms"]);
}

#[tokio::test]
async fn test_missing_include_is_500() {
    let f = fixture();

    let response = f.server.get("/gone").await;

    assert_eq!(response.status_code().as_u16(), 500);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("missing.html"));
    assert_eq!(f.service.transactions().rolled_back(), 1);
}

#[tokio::test]
async fn test_iframe_carries_height() {
    let f = fixture();

    let body: Value = f.server.get("/map").await.json();

    assert_eq!(body["action"]["action"], "iframe");
    assert_eq!(body["action"]["src"], "https://maps.example.org/embed");
    assert_eq!(body["action"]["height"], 300);
}

#[tokio::test]
async fn test_widget_ajax_sets_layout() {
    let f = fixture();

    let body: Value = f.server.get("/clock").await.json();

    assert_eq!(body["ajax"], "widget");
    assert_eq!(body["layout"], "widget");
    assert_eq!(body["action"]["output"], "12:00");
}

#[tokio::test]
async fn test_manual_cron_run_records_notice() {
    let f = fixture();

    let response = get_as(&f.server, "/nightly", "member", Some("ada")).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["action"]["output"], "nightly done");
    let notice = body["notices"][0].as_str().unwrap();
    assert!(notice.starts_with("Cron job 'Nightly' ran at "));
    assert!(
        sitegraph_core::CronLedger::last_run(f.service.store(), NodeId(8))
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_module_route_captures_reach_controller() {
    let f = fixture();

    let body: Value = f.server.get("/docs/page/42?tab=api").await.json();

    assert_eq!(body["node"], 9);
    assert_eq!(body["action"]["path"], "docs/view");
    assert_eq!(body["action"]["output"], "doc 42 tab=api");
}

// =============================================================================
// RATE LIMIT TESTS
// =============================================================================

#[tokio::test]
async fn test_rate_limited_site_request_is_teapot() {
    let f = fixture_with(|config| config.server.rate_limit = 1);

    f.server.get("/about").await.assert_status_ok();
    let response = f.server.get("/about").await;

    assert_eq!(response.status_code().as_u16(), 418);
    let fault: FaultResponse = response.json();
    assert_eq!(fault.fault, AccessFault::RateLimited);
    // Halted before a transaction was opened.
    assert_eq!(f.service.transactions().begun(), 1);
}

#[tokio::test]
async fn test_rate_limited_admin_request_is_teapot() {
    let f = fixture_with(|config| config.server.rate_limit = 1);

    f.server.get("/_admin/status").await.assert_status_ok();
    let response = f.server.get("/_admin/status").await;

    assert_eq!(response.status_code().as_u16(), 418);
}

// =============================================================================
// ADMIN ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_admin_routes_lists_aliases_and_routes() {
    let f = fixture();

    let response = f.server.get("/_admin/routes").await;

    response.assert_status_ok();
    let routes: RoutesResponse = response.json();
    assert_eq!(routes.role, "guest");
    assert_eq!(routes.aliases.get("about"), Some(&NodeId(2)));
    assert!(!routes.aliases.contains_key("members"));
    assert!(
        routes
            .routes
            .iter()
            .any(|r| r.pattern == "page/<:id>" && r.module.as_deref() == Some("docs"))
    );

    let member: RoutesResponse = f.server.get("/_admin/routes?role=member").await.json();
    assert_eq!(member.aliases.get("members"), Some(&NodeId(3)));
}

#[tokio::test]
async fn test_admin_snapshot() {
    let f = fixture();

    let response = f.server.get("/_admin/snapshot?role=member").await;

    response.assert_status_ok();
    let snapshot: SnapshotResponse = response.json();
    assert!(snapshot.success);
    assert_eq!(snapshot.role, "member");
    assert!(snapshot.size > 0);
    assert!(snapshot.data.is_some());
    assert!(!snapshot.fingerprint.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_tree_includes_hidden_children() {
    let f = fixture();

    let body: Value = f.server.get("/_admin/tree?role=guest&root=2").await.json();

    assert_eq!(body["root"], 2);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Terms");
}

#[tokio::test]
async fn test_admin_flush_makes_permission_change_visible() {
    let f = fixture();

    assert_eq!(f.server.get("/members").await.status_code().as_u16(), 401);

    f.service.store().grant(&RoleId::new("guest"), 3).unwrap();
    // Snapshot still cached.
    assert_eq!(f.server.get("/members").await.status_code().as_u16(), 401);

    let response = f.server.post("/_admin/flush?role=guest").await;
    response.assert_status_ok();
    let flush: FlushResponse = response.json();
    assert!(flush.success);
    assert_eq!(flush.role.as_deref(), Some("guest"));

    f.server.get("/members").await.assert_status_ok();
}

#[tokio::test]
async fn test_admin_status() {
    let f = fixture();
    f.server.get("/").await.assert_status_ok();

    let status: StatusResponse = f.server.get("/_admin/status").await.json();

    assert_eq!(status.rows, 10);
    assert_eq!(status.grants, 18);
    assert_eq!(status.roles, vec!["guest".to_string(), "member".to_string()]);
    assert_eq!(status.held_snapshots, 1);
    assert_eq!(status.transactions.committed, 1);
}

// =============================================================================
// AUTHENTICATION MIDDLEWARE TESTS
// =============================================================================

/// Server with admin authentication enabled.
fn auth_fixture(api_key: &str) -> Fixture {
    fixture_with(|_| {
        // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::set_var("SITEGRAPH_API_KEY", api_key) };
    })
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let api_key = "test-secret-key-12345";
    let f = auth_fixture(api_key);

    let response = f
        .server
        .get("/_admin/status")
        .add_header(
            header::AUTHORIZATION,
            format!("Bearer {}", api_key).parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let api_key = "test-raw-key-67890";
    let f = auth_fixture(api_key);

    let response = f
        .server
        .get("/_admin/routes")
        .add_header(header::AUTHORIZATION, api_key.parse::<HeaderValue>().unwrap())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_or_missing_token_rejected() {
    let f = auth_fixture("correct-key");

    let wrong = f
        .server
        .post("/_admin/flush")
        .add_header(
            header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;
    let missing = f.server.get("/_admin/snapshot").await;

    assert_eq!(wrong.status_code().as_u16(), 401);
    assert_eq!(missing.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_does_not_cover_site_or_health() {
    let f = auth_fixture("correct-key");

    f.server.get("/health").await.assert_status_ok();
    f.server.get("/about").await.assert_status_ok();
}
