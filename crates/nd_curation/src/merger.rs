//! Appends a scored batch to the corpus and the ledger.

use std::collections::HashSet;

use nd_core::{Article, Corpus, Error, Ledger, Result};
use tracing::{error, info};

/// The post-merge state, ready to be committed as one unit.
#[derive(Debug, Clone)]
pub struct Merged {
    pub ledger: Ledger,
    pub corpus: Corpus,
    pub appended: Vec<Article>,
}

/// Builds `corpus ∪ batch` and `ledger ∪ urls(batch)`.
///
/// Every URL of `batch` must be absent from both the ledger and the corpus and
/// must appear once in the batch. A violation means the ledger filter was
/// bypassed or the stores are out of sync; it is returned as
/// [`Error::DuplicateUrl`] and nothing is merged. Existing rows are carried
/// over untouched.
pub fn merge(ledger: &Ledger, corpus: &Corpus, batch: Vec<Article>) -> Result<Merged> {
    corpus.check_consistent(ledger)?;

    let mut seen = HashSet::with_capacity(batch.len());
    for article in &batch {
        if ledger.contains(&article.url) || corpus.contains(&article.url) || !seen.insert(article.url.as_str()) {
            error!(url = %article.url, "duplicate url reached the merger");
            return Err(Error::DuplicateUrl {
                url: article.url.clone(),
            });
        }
    }

    let mut merged_corpus = corpus.clone();
    for article in &batch {
        merged_corpus.append(article.clone())?;
    }
    let merged_ledger = ledger.clone().merge(batch.iter().map(|a| a.url.as_str()));
    merged_corpus.check_consistent(&merged_ledger)?;

    info!(
        appended = batch.len(),
        corpus = merged_corpus.len(),
        ledger = merged_ledger.len(),
        "batch merged"
    );
    Ok(Merged {
        ledger: merged_ledger,
        corpus: merged_corpus,
        appended: batch,
    })
}
