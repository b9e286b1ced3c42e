//! Bounded, cancellable, concurrent directory walk used by deep search.
//!
//! Roots are walked one after another, each with a parallel `ignore` walker.
//! Every worker records into one mutex-protected accumulator (seen-set,
//! results, stop reason) and quits as soon as a stop reason is set.

use std::collections::HashSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use ignore::{DirEntry, WalkBuilder, WalkState};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::fs::path::{normalize, relative_slash};

/// Directory names never descended into (unless they are the walk root).
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".cache",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".gradle",
    ".cargo",
    ".rustup",
    ".npm",
    "target",
    "build",
    "dist",
];

pub const DEFAULT_WORKERS: usize = 8;

/// Errors a walk reports to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalkError {
    #[error("walk canceled")]
    Canceled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("walker thread failed: {0}")]
    Worker(String),
}

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    Complete,
    MaxResults,
    Canceled,
    Deadline,
    /// A walker thread panicked.
    Failed,
}

impl Termination {
    pub fn label(&self) -> &'static str {
        match self {
            Termination::Complete => "complete",
            Termination::MaxResults => "max-results",
            Termination::Canceled => "canceled",
            Termination::Deadline => "deadline",
            Termination::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkMetrics {
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub roots_visited: usize,
    pub matches: usize,
    pub termination: Termination,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

#[derive(Debug, Clone)]
pub struct WalkOutcome {
    /// Sorted, deduplicated absolute paths. Partial on cancellation.
    pub results: Vec<PathBuf>,
    pub metrics: WalkMetrics,
    pub error: Option<WalkError>,
}

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Levels below each root; 0 means unlimited.
    pub max_depth: usize,
    pub max_results: usize,
    pub workers: usize,
    pub skip_dirs: HashSet<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: 0,
            max_results: usize::MAX,
            workers: DEFAULT_WORKERS,
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Cancellation handle plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct WalkContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WalkContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_timeout(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(token: CancellationToken, deadline: Instant) -> Self {
        Self {
            token,
            deadline: Some(deadline),
        }
    }

    fn check(&self) -> Option<Stop> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(Stop::Deadline);
        }
        if self.token.is_cancelled() {
            return Some(Stop::Canceled);
        }
        None
    }
}

/// Internal reasons to stop every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Canceled,
    Deadline,
    CapReached,
    Failed,
}

#[derive(Default)]
struct Shared {
    seen: HashSet<PathBuf>,
    results: Vec<PathBuf>,
    stop: Option<Stop>,
    failure: Option<String>,
}

/// State shared by every worker of every root.
struct Collector<'a> {
    query: &'a str,
    opts: &'a WalkOptions,
    ctx: &'a WalkContext,
    on_match: &'a (dyn Fn(&Path) + Sync),
    state: Mutex<Shared>,
}

impl Collector<'_> {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn halt(&self, stop: Stop) {
        self.lock().stop.get_or_insert(stop);
    }

    fn matches(&self, path: &Path, root: &Path) -> bool {
        self.query.is_empty()
            || relative_slash(path, root)
                .to_lowercase()
                .contains(self.query)
    }

    /// Record a match. Returns false once the walk must stop.
    fn record(&self, path: PathBuf) -> bool {
        let mut state = self.lock();
        if state.stop.is_some() {
            return false;
        }
        if !state.seen.insert(path.clone()) {
            return true;
        }
        state.results.push(path.clone());
        let capped = state.results.len() >= self.opts.max_results;
        if capped {
            state.stop = Some(Stop::CapReached);
        }
        drop(state);
        (self.on_match)(&path);
        !capped
    }

    fn visit(&self, root: &Path, entry: Result<DirEntry, ignore::Error>) -> WalkState {
        if let Some(stop) = self.ctx.check() {
            self.halt(stop);
            return WalkState::Quit;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                trace!(%err, "skipping unreadable entry");
                return WalkState::Continue;
            }
        };
        let path = normalize(entry.path());
        if self.matches(&path, root) && !self.record(path) {
            return WalkState::Quit;
        }
        WalkState::Continue
    }

    /// Walk one root with `opts.workers` threads.
    fn walk_root(&self, root: &Path) {
        let skip = Arc::new(self.opts.skip_dirs.clone());
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false)
            .max_depth((self.opts.max_depth > 0).then_some(self.opts.max_depth))
            .threads(self.opts.workers.max(1))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && skip.contains(&*entry.file_name().to_string_lossy()))
            })
            .build_parallel();

        let ran = panic::catch_unwind(AssertUnwindSafe(|| {
            walker.run(|| Box::new(move |entry| self.visit(root, entry)))
        }));
        if ran.is_err() {
            let mut state = self.lock();
            state.stop = Some(Stop::Failed);
            state.failure = Some(format!("panicked while walking {}", root.display()));
        }
    }
}

/// Walk `roots` collecting paths that contain `query`, case-insensitively.
/// The query is matched against the part of each path below its walk root,
/// so directory names above the root never match. A blank query matches
/// everything, including the roots themselves.
pub fn walk(query: &str, roots: &[PathBuf], opts: &WalkOptions, ctx: &WalkContext) -> WalkOutcome {
    walk_with(query, roots, opts, ctx, |_| {})
}

/// [`walk`], calling `on_match` from the worker threads as each new match
/// is recorded.
pub fn walk_with<F>(
    query: &str,
    roots: &[PathBuf],
    opts: &WalkOptions,
    ctx: &WalkContext,
    on_match: F,
) -> WalkOutcome
where
    F: Fn(&Path) + Sync,
{
    let started = Instant::now();
    let query = query.trim().to_lowercase();

    let mut metrics = WalkMetrics {
        elapsed: Duration::ZERO,
        roots_visited: 0,
        matches: 0,
        termination: Termination::Complete,
    };
    if roots.is_empty() || opts.max_results == 0 {
        return WalkOutcome {
            results: Vec::new(),
            metrics,
            error: None,
        };
    }

    let collector = Collector {
        query: &query,
        opts,
        ctx,
        on_match: &on_match,
        state: Mutex::new(Shared::default()),
    };

    for root in roots {
        if let Some(stop) = ctx.check() {
            collector.halt(stop);
            break;
        }
        let root = normalize(root);
        if let Err(err) = fs::metadata(&root) {
            debug!(root = %root.display(), %err, "skipping unopenable walk root");
            continue;
        }
        metrics.roots_visited += 1;
        collector.walk_root(&root);
        if collector.lock().stop.is_some() {
            break;
        }
    }

    let Shared {
        mut results,
        stop,
        failure,
        ..
    } = collector.state.into_inner().unwrap_or_else(|e| e.into_inner());
    results.sort();
    metrics.matches = results.len();
    metrics.elapsed = started.elapsed();

    let error = match stop {
        None => None,
        Some(Stop::CapReached) => {
            metrics.termination = Termination::MaxResults;
            None
        }
        Some(Stop::Deadline) => {
            metrics.termination = Termination::Deadline;
            Some(WalkError::DeadlineExceeded)
        }
        Some(Stop::Canceled) => {
            metrics.termination = Termination::Canceled;
            Some(WalkError::Canceled)
        }
        Some(Stop::Failed) => {
            metrics.termination = Termination::Failed;
            Some(WalkError::Worker(failure.unwrap_or_default()))
        }
    };

    debug!(
        roots = metrics.roots_visited,
        matches = metrics.matches,
        elapsed_ms = metrics.elapsed.as_millis() as u64,
        termination = metrics.termination.label(),
        "walk finished"
    );

    WalkOutcome {
        results,
        metrics,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn opts() -> WalkOptions {
        WalkOptions {
            workers: 4,
            ..WalkOptions::default()
        }
    }

    fn live() -> WalkContext {
        WalkContext::new(CancellationToken::new())
    }

    /// root/
    ///   a.txt
    ///   config
    ///   one/
    ///     two/
    ///       three.txt
    ///       deeper/
    ///         four.txt
    ///   .git/
    ///     config
    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        File::create(root.join("a.txt")).unwrap();
        File::create(root.join("config")).unwrap();
        fs::create_dir_all(root.join("one/two/deeper")).unwrap();
        File::create(root.join("one/two/three.txt")).unwrap();
        File::create(root.join("one/two/deeper/four.txt")).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        File::create(root.join(".git/config")).unwrap();
        dir
    }

    fn is_sorted_unique(paths: &[PathBuf]) -> bool {
        paths.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn no_roots_or_zero_cap_is_empty() {
        let out = walk("x", &[], &opts(), &live());
        assert!(out.results.is_empty());
        assert!(out.error.is_none());

        let dir = setup();
        let zero = WalkOptions {
            max_results: 0,
            ..opts()
        };
        let out = walk("", &[dir.path().to_path_buf()], &zero, &live());
        assert!(out.results.is_empty());
        assert!(out.error.is_none());
    }

    #[test]
    fn blank_query_lists_everything_but_skipped_dirs() {
        let dir = setup();
        let root = normalize(dir.path());
        let out = walk("  ", &[root.clone()], &opts(), &live());

        assert!(out.error.is_none());
        assert_eq!(out.metrics.termination, Termination::Complete);
        assert_eq!(out.metrics.roots_visited, 1);
        assert!(is_sorted_unique(&out.results));
        assert!(out.results.contains(&root));
        assert!(out.results.contains(&root.join("one/two/deeper/four.txt")));
        assert!(!out.results.iter().any(|p| p.starts_with(root.join(".git"))));
        assert_eq!(out.metrics.matches, out.results.len());
    }

    #[test]
    fn max_depth_one_is_root_and_children() {
        let dir = setup();
        let root = normalize(dir.path());
        let shallow = WalkOptions {
            max_depth: 1,
            ..opts()
        };
        let out = walk("", &[root.clone()], &shallow, &live());
        let expected: Vec<PathBuf> = vec![
            root.clone(),
            root.join("a.txt"),
            root.join("config"),
            root.join("one"),
        ];
        assert_eq!(out.results, expected);
    }

    #[test]
    fn max_depth_three_includes_three_excludes_four() {
        let dir = setup();
        let root = normalize(dir.path());
        let three = WalkOptions {
            max_depth: 3,
            ..opts()
        };
        let out = walk("txt", &[root.clone()], &three, &live());
        assert!(out.results.contains(&root.join("one/two/three.txt")));
        assert!(!out.results.contains(&root.join("one/two/deeper/four.txt")));
    }

    #[test]
    fn query_filters_case_insensitively() {
        let dir = setup();
        let root = normalize(dir.path());
        let out = walk("THREE", &[root.clone()], &opts(), &live());
        assert_eq!(out.results, vec![root.join("one/two/three.txt")]);
    }

    #[test]
    fn skip_list_hides_matches_inside_git() {
        let dir = setup();
        let root = normalize(dir.path());
        let out = walk("config", &[root.clone()], &opts(), &live());
        assert_eq!(out.results, vec![root.join("config")]);
        assert!(out
            .results
            .iter()
            .all(|p| !p.components().any(|c| c.as_os_str() == ".git")));
    }

    #[test]
    fn skipped_name_as_root_is_walked() {
        let dir = setup();
        let git = normalize(&dir.path().join(".git"));
        let out = walk("config", &[git.clone()], &opts(), &live());
        assert_eq!(out.results, vec![git.join("config")]);
    }

    #[test]
    fn cap_is_not_an_error() {
        let dir = setup();
        let root = normalize(dir.path());
        let capped = WalkOptions {
            max_results: 1,
            ..opts()
        };
        let out = walk("", &[root], &capped, &live());
        assert!(out.error.is_none());
        assert_eq!(out.metrics.termination, Termination::MaxResults);
        assert!(!out.results.is_empty() && out.results.len() <= 2);
    }

    #[test]
    fn canceled_context_reports_cancellation() {
        let dir = setup();
        let token = CancellationToken::new();
        token.cancel();
        let out = walk("", &[dir.path().to_path_buf()], &opts(), &WalkContext::new(token));
        assert_eq!(out.error, Some(WalkError::Canceled));
        assert_eq!(out.metrics.termination, Termination::Canceled);
        assert!(is_sorted_unique(&out.results));
    }

    #[test]
    fn expired_deadline_reports_deadline() {
        let dir = setup();
        let ctx = WalkContext::with_deadline(
            CancellationToken::new(),
            Instant::now() - Duration::from_millis(1),
        );
        let out = walk("", &[dir.path().to_path_buf()], &opts(), &ctx);
        assert_eq!(out.error, Some(WalkError::DeadlineExceeded));
        assert_eq!(out.metrics.termination, Termination::Deadline);
        assert!(is_sorted_unique(&out.results));
    }

    #[test]
    fn cancel_mid_walk_keeps_partial_results() {
        let dir = TempDir::new().unwrap();
        for d in 0..10 {
            let sub = dir.path().join(format!("d{d}"));
            fs::create_dir(&sub).unwrap();
            for f in 0..20 {
                File::create(sub.join(format!("f{f}.txt"))).unwrap();
            }
        }
        let root = normalize(dir.path());
        let token = CancellationToken::new();
        let single = WalkOptions {
            workers: 1,
            ..opts()
        };

        let out = walk_with(
            "txt",
            &[root.clone()],
            &single,
            &WalkContext::new(token.clone()),
            |_| token.cancel(),
        );

        assert_eq!(out.error, Some(WalkError::Canceled));
        assert_eq!(out.metrics.termination, Termination::Canceled);
        assert!(!out.results.is_empty());
        assert!(out.results.len() < 200);
        assert!(is_sorted_unique(&out.results));
        assert!(out.results.iter().all(|p| p.starts_with(&root)));
    }

    #[test]
    fn on_match_sees_every_recorded_result() {
        let dir = setup();
        let root = normalize(dir.path());
        let streamed = Mutex::new(Vec::new());
        let out = walk_with("txt", &[root], &opts(), &live(), |path| {
            streamed.lock().unwrap().push(path.to_path_buf());
        });
        let mut streamed = streamed.into_inner().unwrap();
        streamed.sort();
        assert_eq!(streamed, out.results);
    }

    #[test]
    fn termination_labels() {
        assert_eq!(Termination::MaxResults.label(), "max-results");
        assert_eq!(Termination::Failed.label(), "failed");
    }

    #[test]
    fn bad_root_is_skipped() {
        let dir = setup();
        let root = normalize(dir.path());
        let out = walk(
            "three",
            &[PathBuf::from("/definitely/not/here"), root.clone()],
            &opts(),
            &live(),
        );
        assert!(out.error.is_none());
        assert_eq!(out.metrics.roots_visited, 1);
        assert_eq!(out.results, vec![root.join("one/two/three.txt")]);
    }

    #[test]
    fn overlapping_roots_deduplicate() {
        let dir = setup();
        let root = normalize(dir.path());
        let out = walk("txt", &[root.clone(), root.join("one")], &opts(), &live());
        assert!(is_sorted_unique(&out.results));
        assert_eq!(out.metrics.roots_visited, 2);
        assert_eq!(
            out.results
                .iter()
                .filter(|p| p.ends_with("three.txt"))
                .count(),
            1
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_dirs_are_not_followed() {
        let dir = setup();
        let root = normalize(dir.path());
        std::os::unix::fs::symlink(root.join("one"), root.join("link")).unwrap();
        let out = walk("three", &[root.clone()], &opts(), &live());
        assert_eq!(out.results, vec![root.join("one/two/three.txt")]);
    }
}
