use std::collections::HashSet;
use std::path::{Path, PathBuf};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::fs::path::relative_slash;

/// Ranked fuzzy matches plus a membership set for tree filtering.
#[derive(Debug, Clone, Default)]
pub struct FuzzyMatches {
    /// Absolute paths, best match first.
    pub paths: Vec<PathBuf>,
    pub set: HashSet<PathBuf>,
}

impl FuzzyMatches {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Match `candidates` against `query`, scoring each on its path relative to
/// `prefix`.
///
/// Candidates must contain the lower-cased query as a contiguous substring
/// of their relative form; survivors are then ranked by the skim fuzzy
/// score. A blank query keeps every candidate in its original order.
pub fn fuzzy_filter(candidates: &[PathBuf], query: &str, prefix: &Path) -> FuzzyMatches {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return FuzzyMatches {
            set: candidates.iter().cloned().collect(),
            paths: candidates.to_vec(),
        };
    }

    let matcher = SkimMatcherV2::default().ignore_case();
    let mut scored: Vec<(i64, String, &PathBuf)> = candidates
        .iter()
        .filter_map(|path| {
            let rel = relative_slash(path, prefix);
            if !rel.to_lowercase().contains(&query) {
                return None;
            }
            let score = matcher.fuzzy_match(&rel, &query)?;
            Some((score, rel, path))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut matches = FuzzyMatches::default();
    for (_, _, path) in scored {
        if matches.set.insert(path.clone()) {
            matches.paths.push(path.clone());
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn blank_query_keeps_everything() {
        let candidates = paths(&["/h/b", "/h/a"]);
        let matches = fuzzy_filter(&candidates, "  ", Path::new("/h"));
        assert_eq!(matches.paths, candidates);
        assert_eq!(matches.set.len(), 2);
    }

    #[test]
    fn substring_gate_rejects_scattered_matches() {
        // "vim" appears scattered in "v/i/m" but not contiguously.
        let candidates = paths(&["/h/.config/nvim/init.lua", "/h/v/i/m"]);
        let matches = fuzzy_filter(&candidates, "vim", Path::new("/h"));
        assert_eq!(matches.paths, paths(&["/h/.config/nvim/init.lua"]));
    }

    #[test]
    fn scores_relative_to_prefix() {
        // The prefix itself contains the query; only the relative part counts.
        let candidates = paths(&["/home/zed/.zshrc", "/home/zed/.bashrc"]);
        let matches = fuzzy_filter(&candidates, "zed", Path::new("/home/zed"));
        assert!(matches.is_empty());
    }

    #[test]
    fn case_insensitive() {
        let candidates = paths(&["/h/README.md"]);
        let matches = fuzzy_filter(&candidates, "ReadMe", Path::new("/h"));
        assert_eq!(matches.len(), 1);
        assert!(matches.set.contains(&PathBuf::from("/h/README.md")));
    }

    #[test]
    fn tighter_match_ranks_first() {
        let candidates = paths(&["/h/src/lib/config_loader.rs", "/h/config"]);
        let matches = fuzzy_filter(&candidates, "config", Path::new("/h"));
        assert_eq!(matches.paths.len(), 2);
        assert_eq!(matches.paths[0], PathBuf::from("/h/config"));
    }

    #[test]
    fn duplicate_candidates_collapse() {
        let candidates = paths(&["/h/a.txt", "/h/a.txt"]);
        let matches = fuzzy_filter(&candidates, "a", Path::new("/h"));
        assert_eq!(matches.paths, paths(&["/h/a.txt"]));
    }
}
