//! Run-wide aggregation of result links per dork.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Mapping from dork to the union of every link delivered for it.
///
/// Merges only ever add links, so the set for a dork never shrinks. Both
/// levels are ordered, which keeps the persisted JSON stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateResults {
    results: BTreeMap<String, BTreeSet<String>>,
}

impl AggregateResults {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `links` into the set for `dork` and returns how many were new.
    ///
    /// The dork is recorded even when `links` is empty.
    pub fn merge<I, S>(&mut self, dork: &str, links: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.results.entry(dork.to_string()).or_default();
        let before = entry.len();
        entry.extend(links.into_iter().map(Into::into));
        entry.len() - before
    }

    pub fn get(&self, dork: &str) -> Option<&BTreeSet<String>> {
        self.results.get(dork)
    }

    /// Number of dorks recorded.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn dorks(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.results.iter().map(|(dork, links)| (dork.as_str(), links))
    }
}
