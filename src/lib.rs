//! webgate - Navigation & Session Gatekeeper for Embedded Web Shells
//!
//! This crate governs a native shell that embeds a web rendering surface and
//! restricts it to one remote web application. Rendering is left to the
//! platform engine; webgate decides which navigations are permitted, how load
//! failures and connectivity loss are surfaced, when the local session is
//! purged, and how device capability requests from content are mediated.
//!
//! # Features
//!
//! - **URL Policy**: https-only allow-list with strict subdomain matching
//! - **Page Lifecycle**: explicit loading / ready / offline state machine
//! - **Session Clearing**: session cookies dropped on logout navigations
//! - **Capability Broker**: single-slot file selection with no hung callers
//!
//! # Architecture
//!
//! ```text
//! Web engine ──▶ NavigationController ──▶ UrlPolicy
//!                     │      │
//!                     │      ├──▶ PageLifecycle ──▶ Surface (indicator, offline panel)
//!                     │      └──▶ SessionStore  ──▶ CookieStore
//!                     ▼
//!              CapabilityBroker ──▶ CapabilityHost (picker, permissions)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use webgate::config::ShellConfig;
//! use webgate::replay::{HostEvent, Replay};
//! use webgate::metrics::Metrics;
//! use std::sync::Arc;
//!
//! let mut replay = Replay::new(&ShellConfig::default(), Arc::new(Metrics::new())).unwrap();
//! replay.apply(HostEvent::Launch { deep_link: None });
//! assert!(!replay.controller().should_navigate("https://evil.test/"));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod capability;
pub mod config;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod policy;
pub mod replay;
pub mod session;
pub mod shell;

// Re-exports for convenience
pub use capability::{CapabilityBroker, FileChooserParams, FileSelection, FileSelectionFuture};
pub use config::ShellConfig;
pub use controller::{BackAction, HostServices, NavigationController, PageLoadError};
pub use error::{Error, Result};
pub use lifecycle::{PageLifecycle, PageState, Visibility};
pub use policy::{AllowSet, PolicyDecision, UrlPolicy};
pub use session::{Cookie, SessionStore};
pub use shell::{CapabilityHost, ConnectivityProbe, CookieStore, Surface};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
