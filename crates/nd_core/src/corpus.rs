//! The cumulative, append-only table of scored articles.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ledger::Ledger;
use crate::types::Article;
use crate::{Error, Result};

/// Scored articles keyed by URL, in insertion order.
///
/// Rows can only be appended; there is no API to replace or remove one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    articles: Vec<Article>,
    index: HashMap<String, usize>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a corpus from persisted rows, rejecting duplicate URLs.
    pub fn from_articles(articles: Vec<Article>) -> Result<Self> {
        let mut corpus = Self::new();
        for article in articles {
            corpus.append(article)?;
        }
        Ok(corpus)
    }

    /// Appends one row. A URL already present is a hard error.
    pub fn append(&mut self, article: Article) -> Result<()> {
        if self.index.contains_key(&article.url) {
            return Err(Error::DuplicateUrl { url: article.url });
        }
        self.index.insert(article.url.clone(), self.articles.len());
        self.articles.push(article);
        Ok(())
    }

    pub fn get(&self, url: &str) -> Option<&Article> {
        self.index.get(url).map(|&i| &self.articles[i])
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// The URLs of the corpus as a ledger, for consistency checks.
    pub fn url_ledger(&self) -> Ledger {
        self.articles.iter().map(|a| a.url.as_str()).collect()
    }

    /// Checks that the corpus and the ledger hold exactly the same URLs.
    pub fn check_consistent(&self, ledger: &Ledger) -> Result<()> {
        if ledger.len() != self.len() {
            return Err(Error::Desync(format!(
                "ledger has {} urls, corpus has {} rows",
                ledger.len(),
                self.len()
            )));
        }
        if let Some(url) = ledger.iter().find(|u| !self.contains(u)) {
            return Err(Error::Desync(format!("{} is in the ledger but not the corpus", url)));
        }
        Ok(())
    }

    /// Distinct cluster ids present, ascending.
    pub fn clusters(&self) -> BTreeSet<usize> {
        self.articles.iter().map(|a| a.cluster).collect()
    }
}

impl Serialize for Corpus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.articles.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Corpus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let articles = Vec::<Article>::deserialize(deserializer)?;
        Corpus::from_articles(articles).map_err(serde::de::Error::custom)
    }
}
