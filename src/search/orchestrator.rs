//! Debounced deep search with request/generation staleness guards.
//!
//! Every debounce timer and walk carries the request id that was current
//! when it was issued; anything arriving with an older id is dropped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{Event, SearchFinished};
use crate::fs::path::normalize;
use crate::fs::walker::{walk, WalkContext, WalkError, WalkMetrics, WalkOptions};
use crate::index::{ClassifiedPathIndex, PathClass};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub walk: WalkOptions,
    pub timeout: Duration,
    pub debounce: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            walk: WalkOptions::default(),
            timeout: DEFAULT_TIMEOUT,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Per-session deep-search bookkeeping.
#[derive(Debug, Default)]
pub struct SearchState {
    /// Sorted, deduplicated absolute paths from the last walk.
    pub raw_results: Vec<PathBuf>,
    pub searching: bool,
    pub paused: bool,
    pub ready: bool,
    pub request: u64,
    /// The query `raw_results` answer.
    pub query: String,
    pub cancel: Option<CancellationToken>,
    pub last_metrics: Option<WalkMetrics>,
    /// User-visible failure message.
    pub error: Option<String>,
}

impl SearchState {
    fn cancel_in_flight(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

/// Drives [`SearchState`] from input changes and background completions.
pub struct SearchOrchestrator {
    state: SearchState,
    options: SearchOptions,
    tx: UnboundedSender<Event>,
}

impl SearchOrchestrator {
    pub fn new(options: SearchOptions, tx: UnboundedSender<Event>) -> Self {
        Self {
            state: SearchState::default(),
            options,
            tx,
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Cancel any in-flight walk and forget all results.
    pub fn reset(&mut self) {
        self.state.cancel_in_flight();
        self.state.raw_results.clear();
        self.state.searching = false;
        self.state.paused = false;
        self.state.ready = false;
        self.state.query.clear();
        self.state.error = None;
    }

    /// React to a change of the live search input.
    ///
    /// `target` is a directory the caller has already checked; it is not
    /// touched here. `None` and views without deep search reset the state
    /// instead.
    pub fn on_input(&mut self, query: &str, deep_search: bool, target: Option<&Path>) {
        let query = query.trim();
        if query.is_empty() || !deep_search || target.is_none() {
            self.reset();
            return;
        }
        if self.state.ready && self.state.query == query {
            return;
        }

        self.state.cancel_in_flight();
        self.state.request += 1;
        self.state.ready = false;
        self.state.raw_results.clear();
        self.state.searching = true;
        self.state.paused = false;
        self.state.error = None;
        self.state.query = query.to_string();

        let request = self.state.request;
        let delay = self.options.debounce;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::SearchDebounce { request });
        });
    }

    /// The debounce timer for `request` fired. Returns true if a walk started.
    pub fn on_debounce(&mut self, request: u64, generation: u64, target: Option<PathBuf>) -> bool {
        if request != self.state.request || !self.state.searching {
            debug!(request, current = self.state.request, "dropping superseded debounce");
            return false;
        }
        let Some(root) = target else {
            self.reset();
            return false;
        };

        let token = CancellationToken::new();
        self.state.cancel = Some(token.clone());
        let ctx = WalkContext::with_timeout(token, self.options.timeout);
        let query = self.state.query.clone();
        let opts = self.options.walk.clone();
        let tx = self.tx.clone();

        debug!(request, generation, query = %query, root = %root.display(), "starting walk");
        tokio::spawn(async move {
            let walk_query = query.clone();
            let outcome =
                tokio::task::spawn_blocking(move || walk(&walk_query, &[root], &opts, &ctx))
                    .await
                    .map_err(|err| err.to_string());
            let _ = tx.send(Event::SearchFinished(SearchFinished {
                request,
                generation,
                query,
                outcome,
            }));
        });
        true
    }

    /// Apply a finished walk. Returns true if it was current and applied.
    pub fn on_finished(&mut self, msg: SearchFinished, generation: u64, live_query: &str) -> bool {
        if msg.request != self.state.request
            || msg.generation != generation
            || msg.query != live_query.trim()
        {
            debug!(
                request = msg.request,
                current = self.state.request,
                "dropping stale search result"
            );
            return false;
        }

        self.state.cancel = None;
        self.state.searching = false;

        let outcome = match msg.outcome {
            Ok(outcome) => outcome,
            Err(message) => {
                self.fail(message);
                return true;
            }
        };
        self.state.last_metrics = Some(outcome.metrics);

        match outcome.error {
            None => {
                self.state.raw_results = outcome.results;
                self.state.ready = true;
                self.state.paused = false;
            }
            Some(WalkError::Canceled) | Some(WalkError::DeadlineExceeded) => {
                self.state.ready = !outcome.results.is_empty();
                self.state.raw_results = outcome.results;
            }
            Some(err @ WalkError::Worker(_)) => self.fail(err.to_string()),
        }
        true
    }

    fn fail(&mut self, message: String) {
        warn!(error = %message, "deep search failed");
        self.state.raw_results.clear();
        self.state.ready = false;
        self.state.paused = false;
        self.state.error = Some(message);
    }

    /// Stop the in-flight walk but keep whatever it has found so far.
    pub fn pause(&mut self) {
        if !self.state.searching {
            return;
        }
        self.state.paused = true;
        match self.state.cancel.take() {
            Some(token) => token.cancel(),
            // Still debouncing: nothing will report back.
            None => self.state.searching = false,
        }
    }

    /// Ready results for `live_query` narrowed to paths the index places in
    /// `class` (any known class when `None`). Unknown paths are dropped.
    pub fn project(
        &self,
        index: &ClassifiedPathIndex,
        class: Option<PathClass>,
        live_query: &str,
    ) -> Option<Vec<PathBuf>> {
        if !self.state.ready || self.state.query != live_query.trim() {
            return None;
        }
        let mut seen = HashSet::new();
        let projected = self
            .state
            .raw_results
            .iter()
            .map(|p| normalize(p))
            .filter(|p| match (index.lookup(p), class) {
                (Some(found), Some(wanted)) => found == wanted,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .filter(|p| seen.insert(p.clone()))
            .collect();
        Some(projected)
    }
}
