//! Headless replay driver
//!
//! Feeds a script of host events (one JSON object per line) through a
//! [`NavigationController`] backed by in-memory host services and reports
//! every effect the gatekeeper produces, also as JSON lines. This is how the
//! gatekeeper is exercised without a web engine.
//!
//! ```text
//! {"event":"launch"}
//! {"event":"navigate","url":"https://evil.test/"}
//! {"event":"page_started","url":"https://app.example.com/mobile"}
//! {"event":"page_finished","url":"https://app.example.com/mobile"}
//! ```

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::capability::{
    ContentResource, FileChooserParams, FileChooserRequest, FileSelection, FileSelectionFuture,
    MediaPermission,
};
use crate::config::ShellConfig;
use crate::controller::{
    BackAction, HostServices, NavigationController, PageLoadError, WindowDisposition,
};
use crate::error::{CapabilityError, Error, Result};
use crate::lifecycle::{PageState, RetryOutcome, Visibility};
use crate::metrics::Metrics;
use crate::session::{Cookie, InMemoryCookieStore};
use crate::shell::{CapabilityHost, Surface};

/// An event delivered by the embedding shell
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// Shell created, optionally through a deep link
    Launch {
        /// Address the app was opened with
        #[serde(default)]
        deep_link: Option<String>,
    },
    /// Change what the connectivity probe answers
    SetOnline {
        /// New connectivity
        online: bool,
    },
    /// Make the host file picker available or not
    SetPickerAvailable {
        /// Whether a picker handler exists
        available: bool,
    },
    /// Content attempted a navigation
    Navigate {
        /// Target address
        url: String,
    },
    /// Main-frame load started
    PageStarted {
        /// Document address
        url: String,
    },
    /// Main-frame load finished
    PageFinished {
        /// Document address
        url: String,
    },
    /// A load failed
    PageError {
        /// Document address
        url: String,
        /// Failure details
        #[serde(flatten)]
        error: PageLoadError,
    },
    /// Connectivity dropped
    ConnectivityLost,
    /// The user pressed retry
    Retry,
    /// The user pressed back
    Back,
    /// The app was opened through a link while running
    DeepLink {
        /// Link address
        url: String,
    },
    /// Content opened a popup
    CreateWindow {
        /// Popup target, when known
        #[serde(default)]
        url: Option<String>,
    },
    /// Content opened a file input
    RequestFiles {
        /// Input attributes
        #[serde(flatten)]
        params: FileChooserParams,
    },
    /// The host picker returned
    FilesSelected {
        /// Chosen file URIs (empty when cancelled)
        #[serde(default)]
        files: Vec<String>,
    },
    /// Content asked for media resources
    PermissionRequest {
        /// Requested resources
        resources: Vec<ContentResource>,
    },
    /// The engine stored a cookie
    SetCookie {
        /// The cookie
        cookie: Cookie,
    },
    /// Shell torn down
    Shutdown,
}

/// An effect produced by the gatekeeper
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Visibility changed
    Render {
        /// New visibility
        visibility: Visibility,
    },
    /// The surface was told to load an address
    LoadUrl {
        /// Address
        url: String,
    },
    /// The surface stepped back in history
    GoBack,
    /// The shell closed
    Close,
    /// Intercept decision
    Navigation {
        /// Attempted address
        url: String,
        /// Whether the surface may follow it
        allowed: bool,
    },
    /// A deep link while running
    DeepLink {
        /// Link address
        url: String,
        /// Whether it was loaded
        loaded: bool,
    },
    /// Retry result
    Retry {
        /// `resume`, `still_offline` or `not_offline`
        outcome: &'static str,
    },
    /// Back result
    Back {
        /// What back did
        action: BackAction,
    },
    /// Popup decision
    Window {
        /// How the popup is handled
        disposition: WindowDisposition,
    },
    /// The host picker was shown
    PickerLaunched {
        /// Request id
        id: Uuid,
    },
    /// Media permissions were requested from the user
    PermissionsRequested {
        /// Requested permissions
        permissions: Vec<MediaPermission>,
    },
    /// Content media request answered
    PermissionsGranted {
        /// Granted resources
        resources: Vec<ContentResource>,
    },
    /// A content file request resolved
    FilesResolved {
        /// Request id
        id: Uuid,
        /// Chosen files (empty when cancelled or replaced)
        files: Vec<String>,
    },
    /// Lifecycle state after the event
    State {
        /// Current state
        state: PageState,
    },
}

/// Shared effect sink for the in-memory host
#[derive(Debug, Default)]
pub struct EffectLog {
    effects: Mutex<Vec<Effect>>,
}

impl EffectLog {
    /// Record an effect
    pub fn push(&self, effect: Effect) {
        self.effects.lock().push(effect);
    }

    /// Take every recorded effect
    pub fn drain(&self) -> Vec<Effect> {
        std::mem::take(&mut *self.effects.lock())
    }
}

/// Surface without an engine: keeps a history stack and logs effects
pub struct HeadlessSurface {
    history: Vec<String>,
    last_rendered: Option<Visibility>,
    closed: bool,
    log: Arc<EffectLog>,
}

impl HeadlessSurface {
    /// Create a surface writing into `log`
    pub fn new(log: Arc<EffectLog>) -> Self {
        Self {
            history: Vec::new(),
            last_rendered: None,
            closed: false,
            log,
        }
    }

    /// Whether the shell was closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Addresses loaded so far, oldest first
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

impl Surface for HeadlessSurface {
    fn load_url(&mut self, url: &str) {
        self.history.push(url.to_string());
        self.log.push(Effect::LoadUrl {
            url: url.to_string(),
        });
    }

    fn can_go_back(&self) -> bool {
        self.history.len() > 1
    }

    fn go_back(&mut self) {
        self.history.pop();
        self.log.push(Effect::GoBack);
    }

    fn render(&mut self, visibility: Visibility) {
        if self.last_rendered != Some(visibility) {
            self.last_rendered = Some(visibility);
            self.log.push(Effect::Render { visibility });
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.log.push(Effect::Close);
    }
}

/// Picker and permission host that answers immediately
///
/// Permission requests are granted on the spot; the picker records the
/// launch and waits for a `files_selected` event.
pub struct ReplayHost {
    granted: Mutex<HashSet<MediaPermission>>,
    picker_available: AtomicBool,
    log: Arc<EffectLog>,
}

impl ReplayHost {
    /// Create a host with no permissions granted and a working picker
    pub fn new(log: Arc<EffectLog>) -> Self {
        Self {
            granted: Mutex::new(HashSet::new()),
            picker_available: AtomicBool::new(true),
            log,
        }
    }

    fn set_picker_available(&self, available: bool) {
        self.picker_available.store(available, Ordering::Relaxed);
    }
}

impl CapabilityHost for ReplayHost {
    fn missing_permissions(&self, wanted: &[MediaPermission]) -> Vec<MediaPermission> {
        let granted = self.granted.lock();
        wanted
            .iter()
            .filter(|p| !granted.contains(*p))
            .copied()
            .collect()
    }

    fn request_permissions(&self, permissions: &[MediaPermission]) {
        self.granted.lock().extend(permissions.iter().copied());
        self.log.push(Effect::PermissionsRequested {
            permissions: permissions.to_vec(),
        });
    }

    fn launch_file_picker(&self, request: &FileChooserRequest) -> std::result::Result<(), CapabilityError> {
        if !self.picker_available.load(Ordering::Relaxed) {
            return Err(CapabilityError::NoHandler("file picker".to_string()));
        }
        self.log.push(Effect::PickerLaunched { id: request.id });
        Ok(())
    }
}

/// Counts for one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Events applied
    pub events: usize,
    /// Effects written
    pub effects: usize,
    /// Whether the shell closed before the script ended
    pub closed: bool,
}

/// A controller wired to in-memory host services
pub struct Replay {
    controller: NavigationController<HeadlessSurface>,
    online: Arc<AtomicBool>,
    host: Arc<ReplayHost>,
    cookies: Arc<InMemoryCookieStore>,
    log: Arc<EffectLog>,
    pending: Vec<FileSelectionFuture>,
}

impl Replay {
    /// Build a replay for `config`, recording into `metrics`
    pub fn new(config: &ShellConfig, metrics: Arc<Metrics>) -> Result<Self> {
        let log = Arc::new(EffectLog::default());
        let online = Arc::new(AtomicBool::new(true));
        let host = Arc::new(ReplayHost::new(log.clone()));
        let cookies = Arc::new(InMemoryCookieStore::new());

        let probe_flag = online.clone();
        let services = HostServices::new(
            Box::new(move || probe_flag.load(Ordering::Relaxed)),
            cookies.clone(),
            host.clone(),
        )
        .with_metrics(metrics);

        let controller =
            NavigationController::new(config, HeadlessSurface::new(log.clone()), services)?;

        Ok(Self {
            controller,
            online,
            host,
            cookies,
            log,
            pending: Vec::new(),
        })
    }

    /// The controller under replay
    pub fn controller(&self) -> &NavigationController<HeadlessSurface> {
        &self.controller
    }

    /// The in-memory cookie jar
    pub fn cookies(&self) -> &InMemoryCookieStore {
        &self.cookies
    }

    /// Apply one event and return the effects it produced
    pub fn apply(&mut self, event: HostEvent) -> Vec<Effect> {
        debug!(?event, "replaying host event");
        let log = self.log.clone();

        match event {
            HostEvent::Launch { deep_link } => {
                self.controller.launch(deep_link.as_deref());
            }
            HostEvent::SetOnline { online } => self.online.store(online, Ordering::Relaxed),
            HostEvent::SetPickerAvailable { available } => {
                self.host.set_picker_available(available)
            }
            HostEvent::Navigate { url } => {
                let allowed = self.controller.should_navigate(&url);
                log.push(Effect::Navigation { url, allowed });
            }
            HostEvent::PageStarted { url } => self.controller.on_page_started(&url),
            HostEvent::PageFinished { url } => self.controller.on_page_finished(&url),
            HostEvent::PageError { url, error } => self.controller.on_page_error(&url, &error),
            HostEvent::ConnectivityLost => self.controller.on_connectivity_lost(),
            HostEvent::Retry => {
                let outcome = match self.controller.retry() {
                    RetryOutcome::Resume(_) => "resume",
                    RetryOutcome::StillOffline => "still_offline",
                    RetryOutcome::NotOffline => "not_offline",
                };
                log.push(Effect::Retry { outcome });
            }
            HostEvent::Back => {
                let action = self.controller.on_back_pressed();
                log.push(Effect::Back { action });
            }
            HostEvent::DeepLink { url } => {
                let loaded = self.controller.on_deep_link(&url);
                log.push(Effect::DeepLink { url, loaded });
            }
            HostEvent::CreateWindow { url } => {
                let disposition = self.controller.on_create_window(url.as_deref());
                log.push(Effect::Window { disposition });
            }
            HostEvent::RequestFiles { params } => {
                let future = self.controller.request_files(params);
                self.pending.push(future);
            }
            HostEvent::FilesSelected { files } => {
                self.controller
                    .complete_file_selection(FileSelection { files });
            }
            HostEvent::PermissionRequest { resources } => {
                let resources = self.controller.on_permission_request(&resources);
                log.push(Effect::PermissionsGranted { resources });
            }
            HostEvent::SetCookie { cookie } => self.cookies.set_cookie(cookie),
            HostEvent::Shutdown => self.controller.shutdown(),
        }

        self.collect_resolved();
        log.push(Effect::State {
            state: self.controller.state(),
        });
        log.drain()
    }

    fn collect_resolved(&mut self) {
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for mut future in self.pending.drain(..) {
            match (&mut future).now_or_never() {
                Some(selection) => self.log.push(Effect::FilesResolved {
                    id: future.id(),
                    files: selection.files,
                }),
                None => still_pending.push(future),
            }
        }
        self.pending = still_pending;
    }

    /// Replay a JSON-lines script from `input`, writing effects to `output`
    ///
    /// Blank lines and lines starting with `#` are skipped. Replay stops
    /// early once the shell closes.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        for (index, line) in input.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let event: HostEvent = serde_json::from_str(trimmed)
                .map_err(|e| Error::generic(format!("line {}: {}", index + 1, e)))?;
            summary.events += 1;

            for effect in self.apply(event) {
                serde_json::to_writer(&mut output, &effect)?;
                output.write_all(b"\n")?;
                summary.effects += 1;
            }

            if self.controller.surface().is_closed() {
                info!("Shell closed; ignoring the rest of the script");
                summary.closed = true;
                break;
            }
        }

        output.flush()?;
        Ok(summary)
    }
}
