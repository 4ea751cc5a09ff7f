//! Device capability brokering
//!
//! Content asks for files; the host shows a picker and reports back once. The
//! broker keeps a single slot for the in-flight request. A second request
//! never silently replaces the first: the stale caller is resolved with an
//! empty selection before the new one takes the slot, so no future is ever
//! left hanging.
//!
//! ```text
//! content ──request_files──▶ broker ──launch_file_picker──▶ host
//!    ▲                         │  ▲                          │
//!    └──── FileSelection ◀─────┘  └───── complete ◀──────────┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::shell::CapabilityHost;

/// Device permissions pre-requested before a file selection
pub const MEDIA_PERMISSIONS: [MediaPermission; 2] =
    [MediaPermission::Camera, MediaPermission::Microphone];

/// Runtime permissions the shell may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPermission {
    /// Camera capture
    Camera,
    /// Audio recording
    Microphone,
}

/// Resources web content can ask the engine for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentResource {
    /// `getUserMedia` video
    VideoCapture,
    /// `getUserMedia` audio
    AudioCapture,
    /// Protected media identifier (DRM)
    ProtectedMediaId,
    /// Web MIDI with sysex
    MidiSysex,
}

/// The kind of result a pending request expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// A list of selected files
    FileSelection,
}

/// What content asked for when opening the picker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChooserParams {
    /// MIME types or extensions from the `accept` attribute
    #[serde(default)]
    pub accept_types: Vec<String>,
    /// `multiple` attribute
    #[serde(default)]
    pub allow_multiple: bool,
    /// `capture` attribute (prefer camera/microphone as the source)
    #[serde(default)]
    pub capture: bool,
}

/// A request handed to the host picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChooserRequest {
    /// Identifier of the pending slot this request occupies
    pub id: Uuid,
    /// Parameters as sent by content
    pub params: FileChooserParams,
}

/// Files chosen by the user; empty means cancelled or abandoned
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    /// Selected file URIs
    pub files: Vec<String>,
}

impl FileSelection {
    /// The "no selection" result
    pub fn empty() -> Self {
        Self::default()
    }

    /// A selection of the given URIs
    pub fn of<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// True when nothing was selected
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Resolves to the selection for one request
///
/// If the broker is dropped without answering, the future resolves empty.
#[derive(Debug)]
pub struct FileSelectionFuture {
    id: Uuid,
    rx: oneshot::Receiver<FileSelection>,
}

impl FileSelectionFuture {
    /// Identifier of the request this future answers
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for FileSelectionFuture {
    type Output = FileSelection;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_default())
    }
}

struct PendingRequest {
    id: Uuid,
    kind: CapabilityKind,
    resolver: oneshot::Sender<FileSelection>,
}

impl PendingRequest {
    fn resolve(self, selection: FileSelection) {
        // A dropped receiver means content stopped waiting; nothing to do.
        if self.resolver.send(selection).is_err() {
            debug!(id = %self.id, "capability receiver already gone");
        }
    }
}

/// Single-slot mediator between content and the host picker
pub struct CapabilityBroker {
    host: Arc<dyn CapabilityHost>,
    pending: Option<PendingRequest>,
    metrics: Arc<Metrics>,
}

impl CapabilityBroker {
    /// Create a broker delegating to `host`
    pub fn new(host: Arc<dyn CapabilityHost>, metrics: Arc<Metrics>) -> Self {
        Self {
            host,
            pending: None,
            metrics,
        }
    }

    /// Identifier of the pending request, if any
    pub fn pending_id(&self) -> Option<Uuid> {
        self.pending.as_ref().map(|p| p.id)
    }

    /// Kind of the pending request, if any
    pub fn pending_kind(&self) -> Option<CapabilityKind> {
        self.pending.as_ref().map(|p| p.kind)
    }

    /// True while a request waits for the host
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Content asked for files
    ///
    /// Any pending request is resolved empty first. Camera and microphone
    /// are requested on the side without waiting for the answer. If the
    /// picker cannot be launched the returned future is already resolved
    /// empty.
    #[instrument(skip(self))]
    pub fn request_files(&mut self, params: FileChooserParams) -> FileSelectionFuture {
        Metrics::incr(&self.metrics.capability_requests);

        if let Some(stale) = self.pending.take() {
            warn!(stale = %stale.id, "replacing pending file request; resolving it empty");
            Metrics::incr(&self.metrics.forced_resolutions);
            stale.resolve(FileSelection::empty());
        }

        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        self.pending = Some(PendingRequest {
            id,
            kind: CapabilityKind::FileSelection,
            resolver: tx,
        });

        self.ensure_media_permissions();

        let request = FileChooserRequest { id, params };
        if let Err(e) = self.host.launch_file_picker(&request) {
            error!("Error launching file picker: {}", e);
            Metrics::incr(&self.metrics.launch_failures);
            if let Some(pending) = self.pending.take() {
                pending.resolve(FileSelection::empty());
            }
        }

        FileSelectionFuture { id, rx }
    }

    /// The host picker finished (or was cancelled)
    ///
    /// Resolves the pending request with `selection` and frees the slot.
    /// Results are not matched by id: whatever request holds the slot gets
    /// them, including a late result from a picker that was already
    /// replaced. Returns the id that was resolved, or `None` when nothing
    /// was pending.
    pub fn complete(&mut self, selection: FileSelection) -> Option<Uuid> {
        match self.pending.take() {
            Some(pending) => {
                let id = pending.id;
                debug!(%id, files = selection.files.len(), "file selection complete");
                pending.resolve(selection);
                Some(id)
            }
            None => {
                debug!("file selection result with nothing pending; ignoring");
                None
            }
        }
    }

    /// Resolve any pending request empty (shell teardown)
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            info!(id = %pending.id, "cancelling pending file request");
            pending.resolve(FileSelection::empty());
        }
    }

    /// Grant a content permission request
    ///
    /// Everything content asks for is granted as-is; the engine only asks
    /// after the page itself has been allowed to load.
    pub fn grant_content_resources(&self, requested: &[ContentResource]) -> Vec<ContentResource> {
        info!(?requested, "granting content permission request");
        requested.to_vec()
    }

    fn ensure_media_permissions(&self) {
        let missing = self.host.missing_permissions(&MEDIA_PERMISSIONS);
        if !missing.is_empty() {
            debug!(?missing, "requesting media permissions");
            self.host.request_permissions(&missing);
        }
    }
}

impl Drop for CapabilityBroker {
    fn drop(&mut self) {
        self.cancel();
    }
}
