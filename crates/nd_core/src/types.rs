use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article as produced by a source, before any validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub url: String,
    pub title: String,
    pub content: String,
    pub source: String,
    /// `None` when the source could not provide or parse a date.
    pub scraping_date: Option<DateTime<Utc>>,
}

/// A raw article plus the normalizer's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedArticle {
    #[serde(flatten)]
    pub raw: RawArticle,
    pub language: String,
    pub word_count: usize,
    pub is_valid: bool,
}

impl NormalizedArticle {
    /// Text handed to the embedding provider, before preprocessing.
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.raw.title, self.raw.content)
    }
}

/// One curated corpus row. Derived fields are written once, when the article
/// is scored, and never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub scraping_date: Option<DateTime<Utc>>,
    pub language: String,
    pub word_count: usize,
    pub is_valid: bool,
    pub embedding: Vec<f32>,
    pub cluster: usize,
    pub similarity_to_centroid: f64,
    pub source_score: f64,
    pub novelty_score: f64,
    pub recency_score: f64,
    pub final_score: f64,
}

/// Top articles of one cluster, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDigest {
    pub cluster: usize,
    /// Name given to the cluster at training time, when the model has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub articles: Vec<Article>,
}

/// The per-run digest: one group per cluster present in the corpus, ordered
/// by cluster id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestSelection {
    pub generated_at: Option<DateTime<Utc>>,
    pub top_n_per_cluster: usize,
    pub clusters: Vec<ClusterDigest>,
}

impl DigestSelection {
    pub fn len(&self) -> usize {
        self.clusters.iter().map(|c| c.articles.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names each group from `names`, indexed by cluster id. Ids past the end
    /// of `names` stay unnamed.
    pub fn label_clusters(&mut self, names: &[String]) {
        for group in &mut self.clusters {
            group.name = names.get(group.cluster).cloned();
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        self.clusters
            .iter()
            .flat_map(|c| c.articles.iter().map(|a| a.url.as_str()))
            .collect()
    }
}
