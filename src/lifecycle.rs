//! Page lifecycle state machine
//!
//! Tracks load progress and connectivity for the embedded surface. The state
//! is an explicit enum; the UI visibility flags the shell renders are derived
//! from it, so combinations such as "loading indicator over the offline
//! panel" cannot be represented.
//!
//! ```text
//!            start(online)          finish
//!   Idle ───────────────▶ Loading ─────────▶ Ready
//!     │                    │  ▲                │
//!     │ start(offline)     │  │ retry(online)  │ main-frame error /
//!     ▼                    ▼  │                ▼ connectivity lost
//!   Offline ◀──────── Errored ◀───────────────┘
//! ```

use serde::Serialize;
use tracing::debug;

use crate::shell::ConnectivityProbe;

/// Lifecycle state of the embedded surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    /// Shell created, nothing requested yet
    Idle,
    /// A main-frame navigation is in flight
    Loading,
    /// The last navigation finished
    Ready,
    /// A main-frame load failed; transient, collapses into `Offline`
    Errored,
    /// Offline panel is up, content is hidden
    Offline,
}

impl PageState {
    /// The UI the shell should show for this state
    pub fn visibility(self) -> Visibility {
        match self {
            PageState::Idle | PageState::Ready => Visibility {
                loading_indicator: false,
                offline_panel: false,
                content: true,
            },
            PageState::Loading => Visibility {
                loading_indicator: true,
                offline_panel: false,
                content: true,
            },
            PageState::Errored | PageState::Offline => Visibility {
                loading_indicator: false,
                offline_panel: true,
                content: false,
            },
        }
    }
}

/// Visibility of the three shell-owned views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visibility {
    /// Progress bar over the content surface
    pub loading_indicator: bool,
    /// Full-screen offline panel with the retry control
    pub offline_panel: bool,
    /// The web content surface itself
    pub content: bool,
}

/// What a retry press resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Connectivity is back; re-issue this navigation (`None` when nothing
    /// was ever requested)
    Resume(Option<String>),
    /// Still offline; the panel stays up
    StillOffline,
    /// Retry only applies while the offline panel is showing
    NotOffline,
}

/// Page lifecycle for one shell instance
#[derive(Debug)]
pub struct PageLifecycle {
    state: PageState,
    last_navigation: Option<String>,
}

impl Default for PageLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PageLifecycle {
    /// Create a lifecycle in `Idle`
    pub fn new() -> Self {
        Self {
            state: PageState::Idle,
            last_navigation: None,
        }
    }

    /// Current state
    pub fn state(&self) -> PageState {
        self.state
    }

    /// Current visibility
    pub fn visibility(&self) -> Visibility {
        self.state.visibility()
    }

    /// The most recent navigation, re-issued by a successful retry
    pub fn last_navigation(&self) -> Option<&str> {
        self.last_navigation.as_deref()
    }

    fn transition(&mut self, to: PageState) {
        if self.state != to {
            debug!(from = ?self.state, to = ?to, "page lifecycle transition");
        }
        self.state = to;
    }

    /// Evaluate connectivity at shell start
    ///
    /// `initial` is remembered as the navigation a later retry will issue.
    /// When the probe reports offline the state jumps straight to `Offline`.
    pub fn start(&mut self, probe: &dyn ConnectivityProbe, initial: Option<&str>) -> PageState {
        if let Some(url) = initial {
            self.last_navigation = Some(url.to_string());
        }
        if !probe.is_online() {
            self.transition(PageState::Offline);
        }
        self.state
    }

    /// A main-frame navigation started; any state moves to `Loading`
    pub fn on_navigation_start(&mut self, url: &str) {
        self.last_navigation = Some(url.to_string());
        self.transition(PageState::Loading);
    }

    /// A main-frame navigation finished
    ///
    /// Only `Loading` advances to `Ready`. Engines report a finish even for
    /// pages that failed, and that must not take down the offline panel.
    pub fn on_navigation_finish(&mut self) -> bool {
        if self.state == PageState::Loading {
            self.transition(PageState::Ready);
            true
        } else {
            debug!(state = ?self.state, "ignoring navigation finish outside Loading");
            false
        }
    }

    /// The top-level document failed to load
    pub fn on_main_frame_error(&mut self) {
        self.transition(PageState::Errored);
        self.transition(PageState::Offline);
    }

    /// Connectivity dropped
    pub fn on_connectivity_lost(&mut self) {
        self.transition(PageState::Offline);
    }

    /// The user pressed the retry control
    pub fn on_retry(&mut self, probe: &dyn ConnectivityProbe) -> RetryOutcome {
        if self.state != PageState::Offline {
            return RetryOutcome::NotOffline;
        }
        if !probe.is_online() {
            return RetryOutcome::StillOffline;
        }
        self.transition(PageState::Loading);
        RetryOutcome::Resume(self.last_navigation.clone())
    }
}
