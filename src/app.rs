use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::event::{
    DirPopulated, Event, EventHandler, ListingTarget, ProjectionBuilt, SourceKind, TreeBuilt,
};
use crate::fs::flatten::{filter, flatten, project, FlatRow};
use crate::fs::path::normalize;
use crate::fs::probe::FileSystem;
use crate::fs::tree::{build_tree, Tree};
use crate::index::{ClassifiedPathIndex, PathClass};
use crate::search::fuzzy::fuzzy_filter;
use crate::search::orchestrator::{SearchOptions, SearchOrchestrator, SearchState};

/// Which slice of the classified paths is browsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum ViewMode {
    #[default]
    Managed,
    Ignored,
    Unmanaged,
    All,
}

impl ViewMode {
    /// The class shown, or `None` for every class.
    pub fn class(&self) -> Option<PathClass> {
        match self {
            ViewMode::Managed => Some(PathClass::Managed),
            ViewMode::Ignored => Some(PathClass::Ignored),
            ViewMode::Unmanaged => Some(PathClass::Unmanaged),
            ViewMode::All => None,
        }
    }

    /// Whether typing in this view walks the disk instead of filtering the
    /// known paths.
    pub fn supports_deep_search(&self) -> bool {
        matches!(self, ViewMode::Unmanaged | ViewMode::All)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Managed => "managed",
            ViewMode::Ignored => "ignored",
            ViewMode::Unmanaged => "unmanaged",
            ViewMode::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProjectionKey {
    generation: u64,
    request: u64,
    view: ViewMode,
}

/// The tree the current rows point into.
#[derive(Debug)]
enum Display {
    Live,
    /// Expanded clone of the live tree, pruned by a fuzzy filter.
    Filtered(Tree),
    /// Synthetic tree of deep-search results.
    Projected { key: ProjectionKey, tree: Tree },
}

/// Browsing session: source lists, classification, live tree, search and
/// the rows currently on screen.
pub struct App {
    fs: Arc<dyn FileSystem>,
    base_dir: PathBuf,
    tx: UnboundedSender<Event>,
    managed: Option<Vec<PathBuf>>,
    ignored: Option<Vec<PathBuf>>,
    unmanaged: Option<Vec<PathBuf>>,
    /// Bumped whenever source data changes.
    generation: u64,
    index: Arc<ClassifiedPathIndex>,
    tree: Tree,
    view: ViewMode,
    input: String,
    search: SearchOrchestrator,
    display: Display,
    rows: Vec<FlatRow>,
    pub selected: usize,
    build_pending: bool,
    projection_pending: Option<ProjectionKey>,
    populate_request: u64,
    pub status_message: Option<(String, Instant)>,
}

impl App {
    /// `base_dir` must be an existing directory; deep search walks it
    /// without checking again.
    pub fn new(
        base_dir: &Path,
        options: SearchOptions,
        fs: Arc<dyn FileSystem>,
        tx: UnboundedSender<Event>,
    ) -> Self {
        let base_dir = normalize(base_dir);
        Self {
            fs,
            tree: Tree::empty(&base_dir),
            base_dir,
            search: SearchOrchestrator::new(options, tx.clone()),
            tx,
            managed: None,
            ignored: None,
            unmanaged: None,
            generation: 0,
            index: Arc::new(ClassifiedPathIndex::default()),
            view: ViewMode::default(),
            input: String::new(),
            display: Display::Live,
            rows: Vec::new(),
            selected: 0,
            build_pending: false,
            projection_pending: None,
            populate_request: 0,
            status_message: None,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn view(&self) -> ViewMode {
        self.view
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn index(&self) -> &ClassifiedPathIndex {
        &self.index
    }

    /// The live tree for the current view.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn search_state(&self) -> &SearchState {
        self.search.state()
    }

    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    /// The tree `rows()` index into.
    pub fn display_tree(&self) -> &Tree {
        match &self.display {
            Display::Live => &self.tree,
            Display::Filtered(tree) | Display::Projected { tree, .. } => tree,
        }
    }

    fn display_tree_mut(&mut self) -> &mut Tree {
        match &mut self.display {
            Display::Live => &mut self.tree,
            Display::Filtered(tree) | Display::Projected { tree, .. } => tree,
        }
    }

    /// Where an opaque directory on screen gets listed into. Filtered views
    /// are clones of the live tree, so they populate the live tree.
    fn listing_target(&self) -> ListingTarget {
        match &self.display {
            Display::Projected { key, .. } => ListingTarget::Projection {
                request: key.request,
                view: key.view,
            },
            Display::Live | Display::Filtered(_) => ListingTarget::Live,
        }
    }

    /// The tree a listing for `target` applies to, if it is still shown.
    fn listing_tree_mut(&mut self, generation: u64, target: ListingTarget) -> Option<&mut Tree> {
        match target {
            ListingTarget::Live => Some(&mut self.tree),
            ListingTarget::Projection { request, view } => match &mut self.display {
                Display::Projected { key, tree }
                    if *key
                        == (ProjectionKey {
                            generation,
                            request,
                            view,
                        }) =>
                {
                    Some(tree)
                }
                _ => None,
            },
        }
    }

    /// True when no background work this session is waiting on is in flight.
    pub fn is_settled(&self) -> bool {
        let loading = |tree: &Tree| tree.ids().any(|id| tree.node(id).loading);
        !self.build_pending
            && self.projection_pending.is_none()
            && !self.search.state().searching
            && !loading(&self.tree)
            && !loading(self.display_tree())
    }

    /// Install one of the three source lists. Any arrival re-runs
    /// classification and tree building under a new generation.
    pub fn set_source(&mut self, kind: SourceKind, paths: Vec<PathBuf>) {
        info!(?kind, count = paths.len(), "source loaded");
        match kind {
            SourceKind::Managed => self.managed = Some(paths),
            SourceKind::Ignored => self.ignored = Some(paths),
            SourceKind::Unmanaged => self.unmanaged = Some(paths),
        }
        self.generation += 1;
        self.rebuild();
        // Walks in flight now answer for an old generation.
        self.search.reset();
        self.sync_search();
    }

    pub fn switch_view(&mut self, view: ViewMode) {
        if view == self.view {
            return;
        }
        self.view = view;
        self.tree = Tree::empty(&self.base_dir);
        self.display = Display::Live;
        self.selected = 0;
        self.rebuild();
        self.sync_search();
    }

    /// Replace the search input.
    pub fn set_input(&mut self, query: &str) {
        self.input = query.to_string();
        self.sync_search();
    }

    /// Stop the running deep search, keeping what it found.
    pub fn pause_search(&mut self) {
        self.search.pause();
        self.refresh_rows();
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::SourceLoaded { kind, paths } => self.set_source(kind, paths),
            Event::TreeBuilt(built) => self.apply_tree(built),
            Event::DirPopulated(msg) => self.apply_populated(msg),
            Event::SearchDebounce { request } => {
                let target = self.base_dir.clone();
                self.search.on_debounce(request, self.generation, Some(target));
            }
            Event::SearchFinished(msg) => {
                if self.search.on_finished(msg, self.generation, &self.input) {
                    if let Some(err) = self.search.state().error.clone() {
                        self.set_status_message(format!("Search failed: {err}"));
                    }
                    self.refresh_rows();
                }
            }
            Event::ProjectionBuilt(built) => self.apply_projection(built),
        }
    }

    /// Process events until the session is settled, or until nothing has
    /// arrived for `idle`.
    pub async fn settle(&mut self, events: &mut EventHandler, idle: Duration) {
        loop {
            if let Some(event) = events.try_next() {
                self.handle_event(event);
                continue;
            }
            if self.is_settled() {
                return;
            }
            match events.next_within(idle).await {
                Some(event) => self.handle_event(event),
                None => {
                    warn!(idle_ms = idle.as_millis() as u64, "gave up waiting for background work");
                    return;
                }
            }
        }
    }

    fn sync_search(&mut self) {
        let deep = self.view.supports_deep_search();
        self.search
            .on_input(&self.input, deep, Some(self.base_dir.as_path()));
        self.refresh_rows();
    }

    fn rebuild(&mut self) {
        let generation = self.generation;
        let view = self.view;
        let managed = self.managed.clone();
        let ignored = self.ignored.clone();
        let unmanaged = self.unmanaged.clone();
        let base_dir = self.base_dir.clone();
        let fs = Arc::clone(&self.fs);
        let tx = self.tx.clone();

        self.build_pending = true;
        tokio::task::spawn_blocking(move || {
            let index = ClassifiedPathIndex::build(
                managed.as_deref(),
                ignored.as_deref(),
                unmanaged.as_deref(),
                fs.as_ref(),
            );
            let tree = tree_for_view(&index, view, &base_dir, fs.as_ref());
            let _ = tx.send(Event::TreeBuilt(TreeBuilt {
                generation,
                view,
                index: Arc::new(index),
                tree,
            }));
        });
    }

    fn apply_tree(&mut self, built: TreeBuilt) {
        if built.generation != self.generation || built.view != self.view {
            debug!(
                generation = built.generation,
                current = self.generation,
                "dropping stale tree"
            );
            return;
        }
        info!(
            view = self.view.label(),
            dirs = built.tree.dir_count,
            files = built.tree.file_count,
            ready = built.index.is_ready(),
            "tree rebuilt"
        );
        self.index = built.index;
        self.tree = built.tree;
        self.build_pending = false;
        self.display = Display::Live;
        self.refresh_rows();
    }

    fn refresh_rows(&mut self) {
        let query = self.input.trim().to_string();
        if query.is_empty() {
            self.display = Display::Live;
            self.projection_pending = None;
            self.rows = flatten(&self.tree);
        } else if self.view.supports_deep_search() {
            self.refresh_deep_rows();
        } else {
            self.projection_pending = None;
            let collapsed = match &self.display {
                Display::Filtered(tree) => user_collapsed(tree),
                _ => HashSet::new(),
            };
            let class = self.view.class().unwrap_or(PathClass::Managed);
            let candidates = self.index.projected_paths(class);
            let matches = fuzzy_filter(&candidates, &query, &self.base_dir);

            let mut tree = self.tree.clone();
            tree.expand_all();
            tree.apply_collapsed(&collapsed);
            self.rows = filter(&tree, &matches.set);
            self.display = Display::Filtered(tree);
        }
        self.clamp_selection();
    }

    fn refresh_deep_rows(&mut self) {
        let Some(paths) = self
            .search
            .project(&self.index, self.view.class(), &self.input)
        else {
            // No provisional rows while a walk is still running.
            self.display = Display::Live;
            self.projection_pending = None;
            self.rows.clear();
            return;
        };

        let key = ProjectionKey {
            generation: self.generation,
            request: self.search.state().request,
            view: self.view,
        };
        if let Display::Projected { key: shown, tree } = &self.display {
            if *shown == key {
                self.rows = flatten(tree);
                return;
            }
        }
        self.rows.clear();
        if self.projection_pending == Some(key) {
            return;
        }

        self.projection_pending = Some(key);
        let matches = fuzzy_filter(&paths, &self.input, &self.base_dir);
        let base_dir = self.base_dir.clone();
        let fs = Arc::clone(&self.fs);
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let projection = project(&matches.paths, &base_dir, fs.as_ref());
            let _ = tx.send(Event::ProjectionBuilt(ProjectionBuilt {
                generation: key.generation,
                request: key.request,
                view: key.view,
                projection,
            }));
        });
    }

    fn apply_projection(&mut self, built: ProjectionBuilt) {
        let key = ProjectionKey {
            generation: built.generation,
            request: built.request,
            view: built.view,
        };
        if self.projection_pending != Some(key) {
            debug!(request = built.request, "dropping stale projection");
            return;
        }
        self.projection_pending = None;
        self.rows = built.projection.rows;
        self.display = Display::Projected {
            key,
            tree: built.projection.tree,
        };
        self.clamp_selection();
    }

    /// Expand or collapse the selected directory, populating it from disk
    /// first if it is opaque.
    pub fn toggle_selected(&mut self) {
        let Some(id) = self.selected_row().map(|row| row.node) else {
            return;
        };
        let node = self.display_tree().node(id);
        if !node.is_dir {
            return;
        }
        if node.opaque {
            let rel = node.rel_path.clone();
            self.populate(&rel);
            return;
        }
        let node = self.display_tree_mut().node_mut(id);
        node.expanded = !node.expanded;
        self.refresh_rows();
    }

    /// List an opaque directory of the displayed tree in the background.
    fn populate(&mut self, rel_path: &str) {
        let generation = self.generation;
        let target = self.listing_target();
        let request = self.populate_request + 1;
        let Some(tree) = self.listing_tree_mut(generation, target) else {
            return;
        };
        let Some(id) = tree.find(rel_path) else {
            debug!(path = rel_path, "no such node to populate");
            return;
        };
        let node = tree.node(id);
        if !node.opaque || node.loading {
            return;
        }
        tree.begin_loading(id, request);
        let path = tree.resolve_abs(id);
        self.populate_request = request;

        let rel_path = rel_path.to_string();
        let fs = Arc::clone(&self.fs);
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = fs.list_dir(&path).map_err(|err| err.to_string());
            let _ = tx.send(Event::DirPopulated(DirPopulated {
                generation,
                request,
                target,
                rel_path,
                result,
            }));
        });
        self.refresh_rows();
    }

    fn apply_populated(&mut self, msg: DirPopulated) {
        if msg.generation != self.generation {
            debug!(path = %msg.rel_path, "dropping listing from old generation");
            return;
        }
        let Some(tree) = self.listing_tree_mut(msg.generation, msg.target) else {
            debug!(path = %msg.rel_path, "dropping listing for a projection no longer shown");
            return;
        };
        let Some(id) = tree.find(&msg.rel_path) else {
            return;
        };
        let node = tree.node(id);
        if !node.loading || node.loading_request != msg.request {
            debug!(path = %msg.rel_path, request = msg.request, "dropping stale listing");
            return;
        }

        match msg.result {
            Ok(entries) => {
                debug!(path = %msg.rel_path, entries = entries.len(), "directory populated");
                tree.populate(id, entries);
            }
            Err(err) => {
                warn!(path = %msg.rel_path, error = %err, "directory population failed");
                tree.clear_loading(id);
                self.set_status_message(format!("Cannot read {}: {err}", msg.rel_path));
            }
        }
        self.refresh_rows();
    }

    /// Set a status message with current timestamp.
    pub fn set_status_message(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now()));
    }

    /// Clear the status message if it has been displayed for more than 3 seconds.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, ref created)) = self.status_message {
            if created.elapsed().as_secs() > 3 {
                self.status_message = None;
            }
        }
    }

    pub fn selected_row(&self) -> Option<&FlatRow> {
        self.rows.get(self.selected)
    }

    /// Absolute path of the selected row.
    pub fn selected_path(&self) -> Option<PathBuf> {
        self.selected_row()
            .map(|row| self.display_tree().resolve_abs(row.node))
    }

    /// Move selection down by one item.
    pub fn select_next(&mut self) {
        let len = self.rows.len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    /// Move selection up by one item.
    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    /// Jump to the first item.
    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    /// Jump to the last item.
    pub fn select_last(&mut self) {
        let len = self.rows.len();
        if len > 0 {
            self.selected = len - 1;
        }
    }

    /// Move the selection to the parent directory's row.
    pub fn jump_to_parent(&mut self) {
        let Some(id) = self.selected_row().map(|row| row.node) else {
            return;
        };
        let Some(parent) = self.display_tree().parent(id) else {
            return;
        };
        if let Some(pos) = self.rows.iter().position(|row| row.node == parent) {
            self.selected = pos;
        }
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }
}

fn tree_for_view(
    index: &ClassifiedPathIndex,
    view: ViewMode,
    base_dir: &Path,
    fs: &dyn FileSystem,
) -> Tree {
    let paths = match view.class() {
        Some(class) => index.projected_paths(class),
        None => index.all_paths().to_vec(),
    };
    let mut tree = build_tree(&paths, base_dir, fs);
    if view == ViewMode::All {
        tree.expand_all();
    }
    tree
}

/// Directories the user collapsed in a filtered clone. Opaque directories
/// are collapsed only because they have nothing loaded yet.
fn user_collapsed(tree: &Tree) -> HashSet<String> {
    tree.collapsed_dirs()
        .into_iter()
        .filter(|rel| tree.find(rel).is_some_and(|id| !tree.node(id).opaque))
        .collect()
}
