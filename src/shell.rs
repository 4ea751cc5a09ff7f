//! Seams to the embedding shell
//!
//! The gatekeeper never touches a web engine directly. Everything it needs
//! from the host (rendering effects, connectivity, cookies, pickers and
//! permissions) goes through the traits in this module.

use crate::capability::{FileChooserRequest, MediaPermission};
use crate::error::{CapabilityError, CookieError};
use crate::lifecycle::Visibility;

/// The content surface and the views around it
pub trait Surface {
    /// Start loading `url` in the content surface
    fn load_url(&mut self, url: &str);

    /// Whether the surface has in-app history to go back to
    fn can_go_back(&self) -> bool;

    /// Step back one history entry
    fn go_back(&mut self);

    /// Apply loading indicator, offline panel and content visibility
    fn render(&mut self, visibility: Visibility);

    /// Close the shell
    fn close(&mut self);
}

/// Point-in-time connectivity query
///
/// Implementations must answer synchronously; the result is never cached by
/// the caller.
pub trait ConnectivityProbe {
    /// True when a usable network is available
    fn is_online(&self) -> bool;
}

impl<F> ConnectivityProbe for F
where
    F: Fn() -> bool,
{
    fn is_online(&self) -> bool {
        self()
    }
}

/// The web engine's cookie jar
pub trait CookieStore: Send + Sync {
    /// Drop every cookie without a persistent expiry, returning how many
    fn remove_session_cookies(&self) -> Result<usize, CookieError>;

    /// Write the cookie jar to durable storage
    fn flush(&self) -> Result<(), CookieError>;
}

/// Host-side fulfilment of device capability requests
pub trait CapabilityHost: Send + Sync {
    /// The subset of `wanted` the shell does not hold yet
    fn missing_permissions(&self, wanted: &[MediaPermission]) -> Vec<MediaPermission>;

    /// Ask the user for `permissions`; the outcome is never reported back
    fn request_permissions(&self, permissions: &[MediaPermission]);

    /// Show the native file picker for `request`
    ///
    /// The selection arrives later through
    /// [`crate::controller::NavigationController::complete_file_selection`].
    fn launch_file_picker(&self, request: &FileChooserRequest) -> Result<(), CapabilityError>;
}
