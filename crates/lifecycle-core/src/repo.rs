//! Repository directory: the opt-in repos an operation can be dispatched to,
//! and the candidate-selection rule over them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{LifecycleError, Result};

/// A candidate execution target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub name: String,
    pub default_branch: String,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    pub owner: String,
}

impl Repo {
    pub fn is_opted_in(&self, opt_in_topic: &str) -> bool {
        self.topics.contains(opt_in_topic)
    }

    /// A repo is a candidate iff every selector is one of its topics.
    pub fn supports(&self, selectors: &BTreeSet<String>) -> bool {
        selectors.is_subset(&self.topics)
    }
}

/// Snapshot of the opt-in repos plus the backend cache token it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoMap {
    pub repos: Vec<Repo>,
    pub validation_tag: Option<String>,
}

impl RepoMap {
    pub fn new(repos: Vec<Repo>, validation_tag: Option<String>) -> Self {
        Self {
            repos,
            validation_tag,
        }
    }

    /// Every repo whose topics are a superset of `selectors`, in snapshot order.
    pub fn select_candidates(&self, selectors: &BTreeSet<String>) -> Vec<&Repo> {
        self.repos.iter().filter(|r| r.supports(selectors)).collect()
    }

    /// Resolve `selectors` to exactly one repo.
    ///
    /// Zero matches is `NotFound`; more than one is `Conflict` naming every match.
    pub fn select_one(&self, selectors: &BTreeSet<String>) -> Result<&Repo> {
        let candidates = self.select_candidates(selectors);
        match candidates.as_slice() {
            [] => Err(LifecycleError::NotFound(
                "no matching workflow found".to_string(),
            )),
            [only] => Ok(*only),
            many => Err(LifecycleError::Conflict {
                repos: many.iter().map(|r| r.name.clone()).collect(),
            }),
        }
    }
}

/// Normalise a caller-supplied selector to the topic alphabet.
///
/// Trims, maps anything that is not an ASCII letter or digit to `-`, and
/// lowercases.
pub fn normalize_selector(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Normalise a selector list into a set, rejecting empty input.
pub fn normalize_selectors<S: AsRef<str>>(raw: &[S]) -> Result<BTreeSet<String>> {
    if raw.is_empty() {
        return Err(LifecycleError::Validation(
            "at least one selector is required".to_string(),
        ));
    }
    let mut out = BTreeSet::new();
    for s in raw {
        let normalized = normalize_selector(s.as_ref());
        if normalized.is_empty() {
            return Err(LifecycleError::Validation(
                "selectors must not be blank".to_string(),
            ));
        }
        out.insert(normalized);
    }
    Ok(out)
}
