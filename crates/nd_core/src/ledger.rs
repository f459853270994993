//! The deduplication ledger: every URL ever ingested, across all runs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A grow-only set of URLs.
///
/// Backed by a `BTreeSet` so that persisted ledgers are byte-stable for the
/// same contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    urls: BTreeSet<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }

    /// Returns the ledger with `new_urls` added. Merging the same set twice
    /// yields the same ledger as merging it once.
    pub fn merge<I, S>(mut self, new_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(new_urls);
        self
    }

    /// In-place variant of [`Ledger::merge`]. Returns how many URLs were new.
    pub fn extend<I, S>(&mut self, new_urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.urls.len();
        self.urls.extend(new_urls.into_iter().map(Into::into));
        self.urls.len() - before
    }

    /// Candidates not yet recorded, in input order.
    pub fn filter_new<'a>(&self, candidates: &'a [String]) -> Vec<&'a String> {
        candidates.iter().filter(|u| !self.contains(u)).collect()
    }

    /// True when every URL of `self` is also in `other`.
    pub fn is_subset(&self, other: &Ledger) -> bool {
        self.urls.is_subset(&other.urls)
    }
}

impl<S: Into<String>> FromIterator<S> for Ledger {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Ledger::new().merge(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec!["https://a.com/1", "https://a.com/2"];
        let once = Ledger::new().merge(batch.clone());
        let twice = once.clone().merge(batch);
        assert_eq!(once, twice);
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn test_extend_counts_only_new() {
        let mut ledger: Ledger = ["https://a.com/1"].into_iter().collect();
        let added = ledger.extend(["https://a.com/1", "https://a.com/2"]);
        assert_eq!(added, 1);
        assert!(ledger.contains("https://a.com/2"));
    }

    #[test]
    fn test_filter_new_keeps_order() {
        let ledger: Ledger = ["b"].into_iter().collect();
        let candidates = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let fresh: Vec<&str> = ledger
            .filter_new(&candidates)
            .into_iter()
            .map(String::as_str)
            .collect();
        assert_eq!(fresh, vec!["c", "a"]);
    }

    #[test]
    fn test_serializes_sorted() {
        let ledger: Ledger = ["z", "a", "m"].into_iter().collect();
        let json = serde_json::to_string(&ledger).unwrap();
        assert_eq!(json, r#"["a","m","z"]"#);
    }
}
