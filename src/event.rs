use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::app::ViewMode;
use crate::error::{AppError, Result};
use crate::fs::flatten::Projection;
use crate::fs::probe::DirEntryInfo;
use crate::fs::tree::Tree;
use crate::fs::walker::WalkOutcome;
use crate::index::ClassifiedPathIndex;

/// Which of the three source lists a batch of paths belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Managed,
    Ignored,
    Unmanaged,
}

/// Index and live tree rebuilt off the event loop.
#[derive(Debug)]
pub struct TreeBuilt {
    pub generation: u64,
    pub view: ViewMode,
    pub index: Arc<ClassifiedPathIndex>,
    pub tree: Tree,
}

/// Which tree an opaque-directory listing was requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingTarget {
    /// The live tree (also behind filtered views, which clone it).
    Live,
    /// The deep-search projection built for `request` in `view`.
    Projection { request: u64, view: ViewMode },
}

/// Listing of an opaque directory.
#[derive(Debug)]
pub struct DirPopulated {
    pub generation: u64,
    pub request: u64,
    pub target: ListingTarget,
    pub rel_path: String,
    pub result: std::result::Result<Vec<DirEntryInfo>, String>,
}

/// Deep-search results laid out as a synthetic tree.
#[derive(Debug)]
pub struct ProjectionBuilt {
    pub generation: u64,
    pub request: u64,
    pub view: ViewMode,
    pub projection: Projection,
}

/// A finished deep-search walk.
#[derive(Debug)]
pub struct SearchFinished {
    pub request: u64,
    pub generation: u64,
    pub query: String,
    /// `Err` when the walk task itself could not complete.
    pub outcome: std::result::Result<WalkOutcome, String>,
}

/// Application events. Background work only ever reports back through these.
#[derive(Debug)]
pub enum Event {
    /// A source list finished loading.
    SourceLoaded {
        kind: SourceKind,
        paths: Vec<PathBuf>,
    },
    TreeBuilt(TreeBuilt),
    DirPopulated(DirPopulated),
    /// The debounce timer for search request `request` fired.
    SearchDebounce { request: u64 },
    SearchFinished(SearchFinished),
    ProjectionBuilt(ProjectionBuilt),
}

/// Owner of the application event channel.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { rx, tx }
    }

    /// Get a sender clone for async tasks to report back on.
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Receive the next event (waits until one is available).
    pub async fn next(&mut self) -> Result<Event> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| AppError::Io(std::io::Error::other("event channel closed")))
    }

    /// Take an already queued event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Receive the next event, or `None` if nothing arrives within `wait`.
    pub async fn next_within(&mut self, wait: Duration) -> Option<Event> {
        tokio::time::timeout(wait, self.rx.recv()).await.ok().flatten()
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
