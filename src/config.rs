//! Shell configuration
//!
//! The allow-list and start address are fixed at build/config time and never
//! edited at runtime. They can be supplied through the builder, through
//! environment variables, or left at their defaults.
//!
//! # Environment Variables
//!
//! - `WEBGATE_START_URL`: address loaded when no deep link is given
//! - `WEBGATE_ALLOWED_HOSTS`: comma separated host suffixes
//! - `WEBGATE_USER_AGENT_SUFFIX`: token appended to the engine user agent

use std::env;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::policy::{AllowSet, UrlPolicy};

/// Environment variable holding the start URL
pub const START_URL_ENV: &str = "WEBGATE_START_URL";
/// Environment variable holding the allow-list
pub const ALLOWED_HOSTS_ENV: &str = "WEBGATE_ALLOWED_HOSTS";
/// Environment variable holding the user agent suffix
pub const USER_AGENT_SUFFIX_ENV: &str = "WEBGATE_USER_AGENT_SUFFIX";

/// Default start address
pub const DEFAULT_START_URL: &str = "https://app.example.com/mobile";
/// Default allow-list
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["app.example.com", "cdn.example.com"];
/// Default user agent suffix
pub const DEFAULT_USER_AGENT_SUFFIX: &str = "WebGateShell/1.0";

/// How the engine treats http sub-resources on https pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedContentMode {
    /// Block every insecure sub-resource
    NeverAllow,
    /// Let the engine decide per resource type
    Compatibility,
}

/// Engine settings the embedding shell must apply to the content surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSettings {
    /// Run page scripts
    pub javascript_enabled: bool,
    /// `localStorage` / `sessionStorage`
    pub dom_storage_enabled: bool,
    /// Web SQL / IndexedDB
    pub database_enabled: bool,
    /// Media may autoplay without a tap
    pub media_playback_requires_user_gesture: bool,
    /// `file://` access from content
    pub allow_file_access: bool,
    /// Content-provider access from content
    pub allow_content_access: bool,
    /// Mixed content handling
    pub mixed_content: MixedContentMode,
    /// Accept first-party cookies
    pub accept_cookies: bool,
    /// Accept third-party cookies
    pub accept_third_party_cookies: bool,
    /// Appended to the engine's default user agent
    pub user_agent_suffix: String,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            javascript_enabled: true,
            dom_storage_enabled: true,
            database_enabled: true,
            media_playback_requires_user_gesture: false,
            allow_file_access: false,
            allow_content_access: true,
            mixed_content: MixedContentMode::NeverAllow,
            accept_cookies: true,
            accept_third_party_cookies: false,
            user_agent_suffix: DEFAULT_USER_AGENT_SUFFIX.to_string(),
        }
    }
}

impl SurfaceSettings {
    /// The full user agent given the engine's default one
    pub fn user_agent(&self, engine_default: &str) -> String {
        if self.user_agent_suffix.is_empty() {
            engine_default.to_string()
        } else {
            format!("{} {}", engine_default, self.user_agent_suffix)
        }
    }
}

/// Configuration for one shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Address loaded when the shell is not opened through a deep link
    pub start_url: String,
    /// Permitted host suffixes
    pub allowed_hosts: Vec<String>,
    /// Engine settings
    pub surface: SurfaceSettings,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            start_url: DEFAULT_START_URL.to_string(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            surface: SurfaceSettings::default(),
        }
    }
}

impl ShellConfig {
    /// Create a new config builder
    pub fn builder() -> ShellConfigBuilder {
        ShellConfigBuilder::default()
    }

    /// Load configuration from environment variables over the defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when `WEBGATE_ALLOWED_HOSTS` is set
    /// but names no host.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = env::var(START_URL_ENV) {
            info!("Start URL from {}: {}", START_URL_ENV, url);
            config.start_url = url.trim().to_string();
        }

        if let Ok(raw) = env::var(ALLOWED_HOSTS_ENV) {
            let hosts = parse_host_list(&raw);
            if hosts.is_empty() {
                return Err(ConfigError::InvalidEnv {
                    var: ALLOWED_HOSTS_ENV,
                    message: "no hosts listed".to_string(),
                });
            }
            config.allowed_hosts = hosts;
        }

        if let Ok(suffix) = env::var(USER_AGENT_SUFFIX_ENV) {
            config.surface.user_agent_suffix = suffix.trim().to_string();
        }

        Ok(config)
    }

    /// Validate the configuration and build the policy it describes
    ///
    /// # Errors
    ///
    /// Fails when the allow-set is invalid or the start URL is refused by it.
    pub fn validate(&self) -> Result<Arc<UrlPolicy>, ConfigError> {
        let policy = UrlPolicy::new(AllowSet::new(self.allowed_hosts.iter().cloned())?);

        if !policy.is_allowed(&self.start_url) {
            return Err(ConfigError::StartUrlNotAllowed(self.start_url.clone()));
        }

        if self.surface.mixed_content != MixedContentMode::NeverAllow {
            warn!("Mixed content is not blocked for the content surface");
        }

        Ok(Arc::new(policy))
    }
}

/// Split a comma separated host list, lowercasing and dropping blanks
pub fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

/// Builder for ShellConfig
#[derive(Default)]
pub struct ShellConfigBuilder {
    config: ShellConfig,
}

impl ShellConfigBuilder {
    /// Set the start URL
    pub fn start_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.start_url = url.into();
        self
    }

    /// Replace the allow-list
    pub fn allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Add one host to the allow-list
    pub fn allow_host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.allowed_hosts.push(host.into());
        self
    }

    /// Set the user agent suffix
    pub fn user_agent_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.config.surface.user_agent_suffix = suffix.into();
        self
    }

    /// Replace the surface settings
    pub fn surface(mut self, surface: SurfaceSettings) -> Self {
        self.config.surface = surface;
        self
    }

    /// Build the config
    pub fn build(self) -> ShellConfig {
        self.config
    }
}
