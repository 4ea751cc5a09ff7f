//! Metrics collection for the shell gatekeeper
//!
//! Atomic counters for navigation decisions, page lifecycle events, logouts
//! and capability requests, with a Prometheus-compatible text export.
//!
//! # Example
//!
//! ```rust
//! use webgate::metrics::global_metrics;
//!
//! global_metrics().record_blocked("host_not_allowed");
//! let output = global_metrics().to_prometheus_format();
//! assert!(output.contains("webgate_navigations_blocked_total"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::RwLock;

/// Counters for one shell process
///
/// Thread-safe, though the controller only ever touches it from the shell's
/// event loop.
#[derive(Debug)]
pub struct Metrics {
    // === Navigation ===
    /// Navigations the policy allowed
    pub navigations_allowed: AtomicU64,
    /// Navigations the policy suppressed
    pub navigations_blocked: AtomicU64,

    // === Page lifecycle ===
    /// Main-frame page starts
    pub page_starts: AtomicU64,
    /// Main-frame page finishes
    pub page_finishes: AtomicU64,
    /// Main-frame load errors
    pub main_frame_errors: AtomicU64,
    /// Retry presses, successful or not
    pub retries: AtomicU64,

    // === Session ===
    /// Logout navigations that cleared session cookies
    pub logouts: AtomicU64,

    // === Capabilities ===
    /// File selection requests from content
    pub capability_requests: AtomicU64,
    /// Pending requests resolved empty because a newer one replaced them
    pub forced_resolutions: AtomicU64,
    /// Picker launches that failed
    pub launch_failures: AtomicU64,

    /// Blocked navigations broken down by reason
    blocked_by_reason: RwLock<HashMap<String, u64>>,

    /// When metrics collection started
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            navigations_allowed: AtomicU64::new(0),
            navigations_blocked: AtomicU64::new(0),
            page_starts: AtomicU64::new(0),
            page_finishes: AtomicU64::new(0),
            main_frame_errors: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            logouts: AtomicU64::new(0),
            capability_requests: AtomicU64::new(0),
            forced_resolutions: AtomicU64::new(0),
            launch_failures: AtomicU64::new(0),
            blocked_by_reason: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record an allowed navigation
    pub fn record_allowed(&self) {
        self.navigations_allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a suppressed navigation
    pub fn record_blocked(&self, reason: &str) {
        self.navigations_blocked.fetch_add(1, Ordering::Relaxed);
        *self
            .blocked_by_reason
            .write()
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    /// Blocked navigations for one reason
    pub fn blocked_for(&self, reason: &str) -> u64 {
        self.blocked_by_reason
            .read()
            .get(reason)
            .copied()
            .unwrap_or(0)
    }

    /// Increment a counter by one
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Seconds since this instance was created
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("webgate_navigations_allowed_total", &self.navigations_allowed),
            ("webgate_navigations_blocked_total", &self.navigations_blocked),
            ("webgate_page_starts_total", &self.page_starts),
            ("webgate_page_finishes_total", &self.page_finishes),
            ("webgate_main_frame_errors_total", &self.main_frame_errors),
            ("webgate_retries_total", &self.retries),
            ("webgate_logouts_total", &self.logouts),
            ("webgate_capability_requests_total", &self.capability_requests),
            ("webgate_capability_forced_resolutions_total", &self.forced_resolutions),
            ("webgate_capability_launch_failures_total", &self.launch_failures),
        ];
        for (name, counter) in counters {
            output.push_str(&format!("{} {}\n", name, Self::get(counter)));
        }

        let mut reasons: Vec<_> = self
            .blocked_by_reason
            .read()
            .iter()
            .map(|(reason, count)| (reason.clone(), *count))
            .collect();
        reasons.sort();
        for (reason, count) in reasons {
            output.push_str(&format!(
                "webgate_navigations_blocked_by_reason{{reason=\"{}\"}} {}\n",
                reason, count
            ));
        }

        output.push_str(&format!("webgate_uptime_seconds {}\n", self.uptime_secs()));
        output
    }
}

/// Global metrics instance
pub static METRICS: OnceLock<Arc<Metrics>> = OnceLock::new();

/// Get or initialize the global metrics instance
pub fn global_metrics() -> Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new())).clone()
}
