//! Navigation controller tests
//!
//! Drive the controller through fake host services and check the effects it
//! produces on the surface, the cookie jar and pending capability requests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use webgate::capability::{
    ContentResource, FileChooserParams, FileChooserRequest, FileSelection, MediaPermission,
};
use webgate::config::ShellConfig;
use webgate::controller::{BackAction, HostServices, NavigationController, WindowDisposition};
use webgate::error::{CapabilityError, CookieError};
use webgate::lifecycle::{PageState, RetryOutcome, Visibility};
use webgate::metrics::Metrics;
use webgate::session::{Cookie, InMemoryCookieStore};
use webgate::shell::{CapabilityHost, CookieStore, Surface};
use webgate::PageLoadError;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct RecordingSurface {
    loads: Vec<String>,
    renders: Vec<Visibility>,
    history_depth: usize,
    back_steps: usize,
    closed: bool,
}

impl Surface for RecordingSurface {
    fn load_url(&mut self, url: &str) {
        self.loads.push(url.to_string());
    }

    fn can_go_back(&self) -> bool {
        self.history_depth > 0
    }

    fn go_back(&mut self) {
        self.history_depth -= 1;
        self.back_steps += 1;
    }

    fn render(&mut self, visibility: Visibility) {
        self.renders.push(visibility);
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Counts clear calls on top of the in-memory jar
#[derive(Default)]
struct CountingCookies {
    inner: InMemoryCookieStore,
    clears: AtomicUsize,
}

impl CookieStore for CountingCookies {
    fn remove_session_cookies(&self) -> Result<usize, CookieError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_session_cookies()
    }

    fn flush(&self) -> Result<(), CookieError> {
        self.inner.flush()
    }
}

#[derive(Default)]
struct FakeCapabilities {
    launches: Mutex<Vec<FileChooserRequest>>,
    fail_launch: AtomicBool,
}

impl CapabilityHost for FakeCapabilities {
    fn missing_permissions(&self, wanted: &[MediaPermission]) -> Vec<MediaPermission> {
        wanted.to_vec()
    }

    fn request_permissions(&self, _permissions: &[MediaPermission]) {}

    fn launch_file_picker(&self, request: &FileChooserRequest) -> Result<(), CapabilityError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(CapabilityError::LaunchFailed("no activity".to_string()));
        }
        self.launches.lock().push(request.clone());
        Ok(())
    }
}

struct Harness {
    controller: NavigationController<RecordingSurface>,
    online: Arc<AtomicBool>,
    cookies: Arc<CountingCookies>,
    capabilities: Arc<FakeCapabilities>,
    metrics: Arc<Metrics>,
}

fn harness() -> Harness {
    harness_with(ShellConfig::default())
}

fn harness_with(config: ShellConfig) -> Harness {
    let online = Arc::new(AtomicBool::new(true));
    let cookies = Arc::new(CountingCookies::default());
    let capabilities = Arc::new(FakeCapabilities::default());
    let metrics = Arc::new(Metrics::new());

    let flag = online.clone();
    let services = HostServices::new(
        Box::new(move || flag.load(Ordering::SeqCst)),
        cookies.clone(),
        capabilities.clone(),
    )
    .with_metrics(metrics.clone());

    let controller =
        NavigationController::new(&config, RecordingSurface::default(), services).unwrap();

    Harness {
        controller,
        online,
        cookies,
        capabilities,
        metrics,
    }
}

fn main_frame_error() -> PageLoadError {
    PageLoadError {
        is_main_frame: true,
        code: -2,
        description: "net::ERR_NAME_NOT_RESOLVED".to_string(),
    }
}

// ============================================================================
// Construction & launch
// ============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let config = ShellConfig::builder()
        .start_url("https://elsewhere.test/")
        .build();
    let services = HostServices::new(
        Box::new(|| true),
        Arc::new(InMemoryCookieStore::new()),
        Arc::new(FakeCapabilities::default()),
    );
    assert!(NavigationController::new(&config, RecordingSurface::default(), services).is_err());
}

#[test]
fn test_launch_loads_start_url() {
    let mut h = harness();
    let target = h.controller.launch(None);

    assert_eq!(target.as_deref(), Some("https://app.example.com/mobile"));
    assert_eq!(
        h.controller.surface().loads,
        vec!["https://app.example.com/mobile"]
    );
    assert_eq!(h.controller.state(), PageState::Idle);
}

#[test]
fn test_launch_with_allowed_deep_link() {
    let mut h = harness();
    h.controller
        .launch(Some("https://app.example.com/orders/42"));
    assert_eq!(
        h.controller.surface().loads,
        vec!["https://app.example.com/orders/42"]
    );
}

#[test]
fn test_launch_with_refused_deep_link_loads_nothing() {
    let mut h = harness();
    let target = h.controller.launch(Some("https://phishing.test/login"));

    assert_eq!(target, None);
    assert!(h.controller.surface().loads.is_empty());
    assert_eq!(h.controller.state(), PageState::Idle);
    assert_eq!(h.metrics.blocked_for("host_not_allowed"), 1);
}

#[test]
fn test_launch_with_insecure_deep_link_loads_nothing() {
    let mut h = harness();
    assert_eq!(h.controller.launch(Some("http://app.example.com/orders/1")), None);
    assert!(h.controller.surface().loads.is_empty());
    assert_eq!(h.metrics.blocked_for("insecure_scheme"), 1);
}

#[test]
fn test_launch_offline_shows_panel_then_loads() {
    let mut h = harness();
    h.online.store(false, Ordering::SeqCst);

    h.controller.launch(None);

    assert_eq!(h.controller.state(), PageState::Offline);
    assert!(h.controller.visibility().offline_panel);
    assert!(!h.controller.visibility().content);
    // Panel is rendered before the load is issued.
    assert!(h.controller.surface().renders[0].offline_panel);
    assert_eq!(
        h.controller.surface().loads,
        vec!["https://app.example.com/mobile"]
    );
}

#[test]
fn test_offline_launch_recovers_through_engine_events() {
    let mut h = harness();
    h.online.store(false, Ordering::SeqCst);
    h.controller.launch(None);

    // The connectivity probe was wrong; the load goes through.
    h.controller.on_page_started("https://app.example.com/mobile");
    assert_eq!(h.controller.state(), PageState::Loading);
    assert!(!h.controller.visibility().offline_panel);

    h.controller.on_page_finished("https://app.example.com/mobile");
    assert_eq!(h.controller.state(), PageState::Ready);
}

#[test]
fn test_retry_after_offline_launch_loads_start_url() {
    let mut h = harness();
    h.online.store(false, Ordering::SeqCst);
    h.controller.launch(None);

    assert_eq!(h.controller.retry(), RetryOutcome::StillOffline);
    assert_eq!(h.controller.state(), PageState::Offline);
    assert_eq!(h.controller.surface().loads.len(), 1);

    h.online.store(true, Ordering::SeqCst);
    assert!(matches!(h.controller.retry(), RetryOutcome::Resume(_)));
    assert_eq!(h.controller.state(), PageState::Loading);
    assert_eq!(
        h.controller.surface().loads,
        vec![
            "https://app.example.com/mobile",
            "https://app.example.com/mobile"
        ]
    );
}

// ============================================================================
// Navigation intercept
// ============================================================================

#[test]
fn test_should_navigate() {
    let h = harness();
    assert!(h.controller.should_navigate("https://app.example.com/x"));
    assert!(h.controller.should_navigate("https://sub.cdn.example.com/a.js"));
    assert!(!h.controller.should_navigate("http://app.example.com"));
    assert!(!h.controller.should_navigate("https://evilapp.example.com"));
    assert!(!h.controller.should_navigate("javascript:alert(1)"));
}

#[test]
fn test_blocked_navigation_changes_nothing() {
    let mut h = harness();
    h.controller.launch(None);
    h.controller.on_page_started("https://app.example.com/mobile");
    h.controller.on_page_finished("https://app.example.com/mobile");
    let renders = h.controller.surface().renders.len();

    assert!(!h.controller.should_navigate("https://tracker.test/pixel"));

    assert_eq!(h.controller.state(), PageState::Ready);
    assert_eq!(h.controller.surface().renders.len(), renders);
    assert_eq!(Metrics::get(&h.metrics.navigations_blocked), 1);
}

#[test]
fn test_deep_link_while_running() {
    let mut h = harness();
    h.controller.launch(None);

    assert!(!h.controller.on_deep_link("https://elsewhere.test/promo"));
    assert_eq!(h.controller.surface().loads.len(), 1);

    assert!(h.controller.on_deep_link("https://app.example.com/promo"));
    assert_eq!(
        h.controller.surface().loads.last().map(String::as_str),
        Some("https://app.example.com/promo")
    );
}

#[test]
fn test_popup_reuses_surface() {
    let mut h = harness();
    assert_eq!(
        h.controller.on_create_window(None),
        WindowDisposition::ReuseCurrentSurface
    );
    assert_eq!(
        h.controller
            .on_create_window(Some("https://app.example.com/help")),
        WindowDisposition::ReuseCurrentSurface
    );
    assert_eq!(
        h.controller.on_create_window(Some("https://ads.test/")),
        WindowDisposition::Deny
    );
}

// ============================================================================
// Page lifecycle
// ============================================================================

#[test]
fn test_page_start_and_finish() {
    let mut h = harness();
    h.controller.on_page_started("https://app.example.com/mobile");
    assert_eq!(h.controller.state(), PageState::Loading);
    assert_eq!(
        h.controller.surface().renders.last(),
        Some(&PageState::Loading.visibility())
    );

    h.controller.on_page_finished("https://app.example.com/mobile");
    assert_eq!(h.controller.state(), PageState::Ready);
    assert!(!h.controller.visibility().loading_indicator);
}

#[test]
fn test_page_finish_flushes_cookies() {
    let mut h = harness();
    h.controller.on_page_started("https://app.example.com/mobile");
    h.controller.on_page_finished("https://app.example.com/mobile");
    assert_eq!(h.cookies.inner.flush_count(), 1);
}

#[test]
fn test_main_frame_error_goes_offline() {
    let mut h = harness();
    h.controller.on_page_started("https://app.example.com/mobile");
    h.controller
        .on_page_error("https://app.example.com/mobile", &main_frame_error());

    assert_eq!(h.controller.state(), PageState::Offline);
    assert!(h.controller.visibility().offline_panel);

    // The engine still reports a finish for the failed page.
    h.controller.on_page_finished("https://app.example.com/mobile");
    assert_eq!(h.controller.state(), PageState::Offline);
}

#[test]
fn test_sub_resource_error_is_ignored() {
    let mut h = harness();
    h.controller.on_page_started("https://app.example.com/mobile");
    h.controller.on_page_error(
        "https://cdn.example.com/font.woff2",
        &PageLoadError {
            is_main_frame: false,
            code: 404,
            description: "not found".to_string(),
        },
    );
    assert_eq!(h.controller.state(), PageState::Loading);
    assert_eq!(Metrics::get(&h.metrics.main_frame_errors), 0);
}

#[test]
fn test_retry_reissues_last_navigation() {
    let mut h = harness();
    h.controller.launch(None);
    h.controller.on_page_started("https://app.example.com/cart");
    h.controller
        .on_page_error("https://app.example.com/cart", &main_frame_error());

    h.online.store(false, Ordering::SeqCst);
    assert_eq!(h.controller.retry(), RetryOutcome::StillOffline);

    h.online.store(true, Ordering::SeqCst);
    assert_eq!(
        h.controller.retry(),
        RetryOutcome::Resume(Some("https://app.example.com/cart".to_string()))
    );
    assert_eq!(
        h.controller.surface().loads.last().map(String::as_str),
        Some("https://app.example.com/cart")
    );
    assert_eq!(Metrics::get(&h.metrics.retries), 2);
}

#[test]
fn test_connectivity_lost_shows_offline() {
    let mut h = harness();
    h.controller.on_page_started("https://app.example.com/mobile");
    h.controller.on_page_finished("https://app.example.com/mobile");
    h.controller.on_connectivity_lost();
    assert_eq!(h.controller.state(), PageState::Offline);
}

// ============================================================================
// Logout
// ============================================================================

#[test]
fn test_logout_clears_once_per_start() {
    let mut h = harness();
    h.cookies
        .inner
        .set_cookie(Cookie::session("sid", "abc", "app.example.com"));
    h.cookies.inner.set_cookie(Cookie::persistent(
        "remember_me",
        "1",
        "app.example.com",
        Utc::now() + Duration::days(30),
    ));

    h.controller.on_page_started("https://app.example.com/logout");
    assert_eq!(h.cookies.clears.load(Ordering::SeqCst), 1);

    h.controller.on_page_finished("https://app.example.com/logout");
    assert_eq!(h.cookies.clears.load(Ordering::SeqCst), 1);

    let remaining = h.cookies.inner.cookies();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "remember_me");
    assert_eq!(Metrics::get(&h.metrics.logouts), 1);
}

#[test]
fn test_non_logout_start_does_not_clear() {
    let mut h = harness();
    h.controller.on_page_started("https://app.example.com/login");
    assert_eq!(h.cookies.clears.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Back navigation
// ============================================================================

#[test]
fn test_back_closes_when_offline() {
    let mut h = harness();
    h.controller.surface_mut().history_depth = 3;
    h.controller.on_connectivity_lost();

    assert_eq!(h.controller.on_back_pressed(), BackAction::Close);
    assert!(h.controller.surface().closed);
    assert_eq!(h.controller.surface().back_steps, 0);
}

#[test]
fn test_back_steps_through_history() {
    let mut h = harness();
    h.controller.surface_mut().history_depth = 1;

    assert_eq!(h.controller.on_back_pressed(), BackAction::GoBack);
    assert_eq!(h.controller.surface().back_steps, 1);
    assert!(!h.controller.surface().closed);

    assert_eq!(h.controller.on_back_pressed(), BackAction::Close);
    assert!(h.controller.surface().closed);
}

// ============================================================================
// Capabilities
// ============================================================================

#[tokio::test]
async fn test_file_request_round_trip() {
    let mut h = harness();
    let future = h.controller.request_files(FileChooserParams {
        accept_types: vec!["image/*".to_string()],
        allow_multiple: true,
        capture: false,
    });

    assert_eq!(h.capabilities.launches.lock().len(), 1);
    assert_eq!(
        h.controller
            .complete_file_selection(FileSelection::of(["content://media/1", "content://media/2"])),
        Some(future.id())
    );
    assert_eq!(future.await.files.len(), 2);
}

#[tokio::test]
async fn test_second_request_resolves_first() {
    let mut h = harness();
    let first = h.controller.request_files(FileChooserParams::default());
    let second = h.controller.request_files(FileChooserParams::default());

    assert_eq!(h.controller.broker().pending_id(), Some(second.id()));
    assert!(first.await.is_empty());
    assert_eq!(Metrics::get(&h.metrics.forced_resolutions), 1);
}

#[tokio::test]
async fn test_launch_failure_resolves_empty() {
    let mut h = harness();
    h.capabilities.fail_launch.store(true, Ordering::SeqCst);

    let future = h.controller.request_files(FileChooserParams::default());
    assert!(!h.controller.broker().has_pending());
    assert!(future.await.is_empty());
}

#[tokio::test]
async fn test_shutdown_resolves_pending() {
    let mut h = harness();
    let future = h.controller.request_files(FileChooserParams::default());
    h.controller.shutdown();
    assert!(future.await.is_empty());
}

#[tokio::test]
async fn test_closing_via_back_resolves_pending() {
    let mut h = harness();
    let future = h.controller.request_files(FileChooserParams::default());
    assert_eq!(h.controller.on_back_pressed(), BackAction::Close);
    assert!(future.await.is_empty());
}

#[test]
fn test_permission_request_granted() {
    let h = harness();
    let granted = h
        .controller
        .on_permission_request(&[ContentResource::AudioCapture]);
    assert_eq!(granted, vec![ContentResource::AudioCapture]);
}

#[test]
fn test_custom_allow_list() {
    let config = ShellConfig::builder()
        .start_url("https://portal.test/")
        .allowed_hosts(["portal.test"])
        .build();
    let h = harness_with(config);
    assert!(h.controller.should_navigate("https://eu.portal.test/"));
    assert!(!h.controller.should_navigate("https://app.example.com/"));
}
