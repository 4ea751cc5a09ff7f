//! Navigation controller
//!
//! Orchestrates the gatekeeper for one shell instance: every navigation the
//! content surface attempts is checked against the [`UrlPolicy`], page
//! start/finish/error events drive the [`PageLifecycle`], logout navigations
//! clear the session, and file requests go through the
//! [`CapabilityBroker`].
//!
//! All callbacks arrive serially on the shell's event loop, hence `&mut self`
//! everywhere and no internal locking.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::capability::{
    CapabilityBroker, ContentResource, FileChooserParams, FileSelection, FileSelectionFuture,
};
use crate::config::ShellConfig;
use crate::error::ConfigError;
use crate::lifecycle::{PageLifecycle, PageState, RetryOutcome, Visibility};
use crate::metrics::{global_metrics, Metrics};
use crate::policy::{PolicyDecision, UrlPolicy};
use crate::session::SessionStore;
use crate::shell::{CapabilityHost, ConnectivityProbe, CookieStore, Surface};

/// Log target for suppressed navigations
pub const SECURITY_TARGET: &str = "webgate::security";

/// Host collaborators other than the surface
pub struct HostServices {
    /// Connectivity query
    pub probe: Box<dyn ConnectivityProbe>,
    /// The engine's cookie jar
    pub cookies: Arc<dyn CookieStore>,
    /// Picker and permission host
    pub capabilities: Arc<dyn CapabilityHost>,
    /// Where counters are recorded
    pub metrics: Arc<Metrics>,
}

impl HostServices {
    /// Bundle host collaborators, recording into the global metrics
    pub fn new(
        probe: Box<dyn ConnectivityProbe>,
        cookies: Arc<dyn CookieStore>,
        capabilities: Arc<dyn CapabilityHost>,
    ) -> Self {
        Self {
            probe,
            cookies,
            capabilities,
            metrics: global_metrics(),
        }
    }

    /// Record into `metrics` instead of the global instance
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// A load failure reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLoadError {
    /// Whether the failing request was the top-level document
    pub is_main_frame: bool,
    /// Engine error code
    #[serde(default)]
    pub code: i32,
    /// Engine error description
    #[serde(default)]
    pub description: String,
}

/// What the back control did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackAction {
    /// Stepped back in the surface history
    GoBack,
    /// Closed the shell
    Close,
}

/// How a popup request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowDisposition {
    /// Load the popup into the current surface
    ReuseCurrentSurface,
    /// Refuse the popup
    Deny,
}

/// Gatekeeper for one shell instance
pub struct NavigationController<S: Surface> {
    policy: Arc<UrlPolicy>,
    start_url: String,
    surface: S,
    probe: Box<dyn ConnectivityProbe>,
    session: SessionStore,
    lifecycle: PageLifecycle,
    broker: CapabilityBroker,
    metrics: Arc<Metrics>,
}

impl<S: Surface> NavigationController<S> {
    /// Create a controller for `config`
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate.
    pub fn new(
        config: &ShellConfig,
        surface: S,
        services: HostServices,
    ) -> Result<Self, ConfigError> {
        let policy = config.validate()?;
        let HostServices {
            probe,
            cookies,
            capabilities,
            metrics,
        } = services;

        Ok(Self {
            policy,
            start_url: config.start_url.clone(),
            surface,
            probe,
            session: SessionStore::new(cookies),
            lifecycle: PageLifecycle::new(),
            broker: CapabilityBroker::new(capabilities, metrics.clone()),
            metrics,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> PageState {
        self.lifecycle.state()
    }

    /// Current visibility
    pub fn visibility(&self) -> Visibility {
        self.lifecycle.visibility()
    }

    /// The policy in force
    pub fn policy(&self) -> &Arc<UrlPolicy> {
        &self.policy
    }

    /// The embedding surface
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// The embedding surface, mutably
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// The capability broker
    pub fn broker(&self) -> &CapabilityBroker {
        &self.broker
    }

    fn render(&mut self) {
        let visibility = self.lifecycle.visibility();
        self.surface.render(visibility);
    }

    /// Start the shell
    ///
    /// Without a deep link the start URL is loaded. A deep link is loaded
    /// only when the policy allows it; a refused link loads nothing. When
    /// the device is offline the offline panel goes up before the first
    /// load is issued, and the engine's start or error events take it from
    /// there. Returns the address loaded, if any.
    #[instrument(skip(self))]
    pub fn launch(&mut self, deep_link: Option<&str>) -> Option<String> {
        let target = match deep_link {
            Some(link) if self.should_navigate(link) => Some(link.to_string()),
            Some(_) => {
                info!("Deep link refused; nothing loaded");
                None
            }
            None => Some(self.start_url.clone()),
        };

        let state = self.lifecycle.start(self.probe.as_ref(), target.as_deref());
        self.render();

        if state == PageState::Offline {
            warn!("No connectivity at launch");
        }
        if let Some(url) = &target {
            self.surface.load_url(url);
        }
        target
    }

    /// Navigation intercept: may the surface follow `url`
    ///
    /// Refusals are silent for the user and logged on the security target.
    pub fn should_navigate(&self, url: &str) -> bool {
        match self.policy.evaluate(url) {
            PolicyDecision::Allowed => {
                self.metrics.record_allowed();
                true
            }
            PolicyDecision::Rejected(reason) => {
                self.metrics.record_blocked(reason.as_str());
                warn!(target: SECURITY_TARGET, %url, %reason, "Blocking external navigation");
                false
            }
        }
    }

    /// The app was asked to open `url` while running
    ///
    /// Refused links load nothing. Returns whether the link was loaded.
    #[instrument(skip(self))]
    pub fn on_deep_link(&mut self, url: &str) -> bool {
        if !self.should_navigate(url) {
            return false;
        }
        self.surface.load_url(url);
        true
    }

    /// The engine started loading a main-frame document
    #[instrument(skip(self))]
    pub fn on_page_started(&mut self, url: &str) {
        Metrics::incr(&self.metrics.page_starts);
        info!("Loading URL: {}", url);

        self.lifecycle.on_navigation_start(url);
        self.render();

        if self.session.clear_on_logout(url) {
            Metrics::incr(&self.metrics.logouts);
        }
    }

    /// The engine finished a main-frame document
    #[instrument(skip(self))]
    pub fn on_page_finished(&mut self, url: &str) {
        Metrics::incr(&self.metrics.page_finishes);

        self.lifecycle.on_navigation_finish();
        self.render();
        self.session.persist();

        info!("Page ready: {}", url);
    }

    /// The engine reported a load error
    ///
    /// Only main-frame errors matter; sub-resource failures are ignored.
    #[instrument(skip(self))]
    pub fn on_page_error(&mut self, url: &str, err: &PageLoadError) {
        if !err.is_main_frame {
            debug!("Ignoring sub-resource error for {}", url);
            return;
        }

        Metrics::incr(&self.metrics.main_frame_errors);
        error!("Main frame error: {} ({})", err.description, err.code);

        self.lifecycle.on_main_frame_error();
        self.render();
    }

    /// Connectivity dropped while the shell was running
    pub fn on_connectivity_lost(&mut self) {
        warn!("Connectivity lost");
        self.lifecycle.on_connectivity_lost();
        self.render();
    }

    /// The user pressed retry on the offline panel
    #[instrument(skip(self))]
    pub fn retry(&mut self) -> RetryOutcome {
        Metrics::incr(&self.metrics.retries);

        let outcome = self.lifecycle.on_retry(self.probe.as_ref());
        match &outcome {
            RetryOutcome::Resume(last) => {
                let target = last.clone().unwrap_or_else(|| self.start_url.clone());
                info!("Connectivity restored; reloading {}", target);
                self.render();
                self.surface.load_url(&target);
            }
            RetryOutcome::StillOffline => debug!("Retry while still offline"),
            RetryOutcome::NotOffline => debug!("Retry outside the offline panel"),
        }
        outcome
    }

    /// The user pressed back
    pub fn on_back_pressed(&mut self) -> BackAction {
        let action = if self.lifecycle.visibility().offline_panel {
            BackAction::Close
        } else if self.surface.can_go_back() {
            BackAction::GoBack
        } else {
            BackAction::Close
        };

        match action {
            BackAction::GoBack => self.surface.go_back(),
            BackAction::Close => {
                info!("Closing shell");
                self.broker.cancel();
                self.surface.close();
            }
        }
        action
    }

    /// Content opened a popup
    ///
    /// Popups never get their own window; allowed targets load in the
    /// current surface, where the intercept still applies to them.
    pub fn on_create_window(&mut self, target: Option<&str>) -> WindowDisposition {
        match target {
            Some(url) if !self.should_navigate(url) => WindowDisposition::Deny,
            _ => WindowDisposition::ReuseCurrentSurface,
        }
    }

    /// Content asked for files
    pub fn request_files(&mut self, params: FileChooserParams) -> FileSelectionFuture {
        self.broker.request_files(params)
    }

    /// The host picker returned
    pub fn complete_file_selection(&mut self, selection: FileSelection) -> Option<Uuid> {
        self.broker.complete(selection)
    }

    /// Content asked for media resources
    pub fn on_permission_request(&self, requested: &[ContentResource]) -> Vec<ContentResource> {
        self.broker.grant_content_resources(requested)
    }

    /// Tear the shell down, resolving any pending request empty
    pub fn shutdown(&mut self) {
        self.broker.cancel();
    }
}
