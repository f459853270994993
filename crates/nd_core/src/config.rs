//! Run configuration, read from a TOML file.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! [`AppConfig::validate`] runs on every load and is the only place where
//! numeric ranges are enforced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "digest.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub curation: CurationConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl AppConfig {
    /// Loads and validates `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            Self::from_toml(&text)?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            config
        };
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.curation;
        if !(c.decay_days.is_finite() && c.decay_days > 0.0) {
            return Err(Error::Config(format!("decay_days must be > 0, got {}", c.decay_days)));
        }
        if c.top_n_per_cluster < 1 {
            return Err(Error::Config("top_n_per_cluster must be >= 1".into()));
        }
        self.scoring.weights.validate()?;
        self.scoring.sources.validate()?;
        let s = &self.scraping;
        if s.timeout_secs == 0 {
            return Err(Error::Config("scraping.timeout_secs must be >= 1".into()));
        }
        if s.listing_timeout_secs < s.timeout_secs {
            return Err(Error::Config(format!(
                "scraping.listing_timeout_secs ({}) must be >= timeout_secs ({})",
                s.listing_timeout_secs, s.timeout_secs
            )));
        }
        if self.scraping.max_concurrency == 0 {
            return Err(Error::Config("scraping.max_concurrency must be >= 1".into()));
        }
        if self.embedding.provider == EmbeddingProviderKind::Hashing && self.embedding.dimensions == 0 {
            return Err(Error::Config("embedding.dimensions must be >= 1".into()));
        }
        let mut names = std::collections::HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name()) {
                return Err(Error::Config(format!("duplicate source name: {}", source.name())));
            }
        }
        Ok(())
    }
}

/// How `novelty_score` is computed. One mode per run, never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyMode {
    /// `1 - mean cosine similarity` to the other batch members of the cluster.
    #[default]
    ClusterBatch,
    /// `1 - similarity_to_centroid`, for scoring articles one at a time.
    CentroidDistance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    #[serde(default = "default_decay_days")]
    pub decay_days: f64,
    #[serde(default = "default_top_n")]
    pub top_n_per_cluster: usize,
    #[serde(default)]
    pub novelty_mode: NoveltyMode,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            decay_days: default_decay_days(),
            top_n_per_cluster: default_top_n(),
            novelty_mode: NoveltyMode::default(),
        }
    }
}

fn default_decay_days() -> f64 {
    30.0
}
fn default_top_n() -> usize {
    5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub sources: SourceScores,
}

/// Weights of the final score. A weighted sum, not an average: they need not
/// add up to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub w_similarity: f64,
    pub w_novelty: f64,
    pub w_recency: f64,
    pub w_source: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            w_similarity: 0.4,
            w_novelty: 0.3,
            w_recency: 0.2,
            w_source: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("w_similarity", self.w_similarity),
            ("w_novelty", self.w_novelty),
            ("w_recency", self.w_recency),
            ("w_source", self.w_source),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Config(format!("{} must be a finite value >= 0, got {}", name, w)));
            }
        }
        Ok(())
    }
}

/// Hand-curated trust weight per source name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceScores {
    #[serde(default = "default_source_score")]
    pub default_score: f64,
    #[serde(default = "default_source_table")]
    pub table: BTreeMap<String, f64>,
}

impl Default for SourceScores {
    fn default() -> Self {
        Self {
            default_score: default_source_score(),
            table: default_source_table(),
        }
    }
}

impl SourceScores {
    pub fn score(&self, source: &str) -> f64 {
        self.table.get(source).copied().unwrap_or(self.default_score)
    }

    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.default_score) {
            return Err(Error::Config(format!(
                "default source score must be in [0,1], got {}",
                self.default_score
            )));
        }
        if let Some((name, v)) = self.table.iter().find(|(_, v)| !in_range(**v)) {
            return Err(Error::Config(format!("source score for {} must be in [0,1], got {}", name, v)));
        }
        Ok(())
    }
}

fn default_source_score() -> f64 {
    0.5
}

fn default_source_table() -> BTreeMap<String, f64> {
    [
        ("TechCrunch", 1.0),
        ("Hugging Face Blog", 0.9),
        ("AWS ML Blog", 0.85),
        ("Xataka", 0.7),
        ("Wired ES", 0.6),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            languages: default_languages(),
        }
    }
}

fn default_min_words() -> usize {
    150
}
fn default_languages() -> Vec<String> {
    vec!["es".into(), "en".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Budget for one network call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Budget for one source's whole listing, across all its pages.
    #[serde(default = "default_listing_timeout_secs")]
    pub listing_timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            listing_timeout_secs: default_listing_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_listing_timeout_secs() -> u64 {
    60
}
fn default_max_concurrency() -> usize {
    8
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; nd/0.1)".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    Hashing,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            dimensions: default_dimensions(),
            base_url: default_base_url(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_dimensions() -> usize {
    384
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_cluster_model_path")]
    pub cluster_model_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            data_dir: default_data_dir(),
            cluster_model_path: default_cluster_model_path(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_cluster_model_path() -> PathBuf {
    PathBuf::from("models/cluster_model.json")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// One configured article source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Listing pages scraped with CSS selectors.
    Html {
        name: String,
        listing_urls: Vec<String>,
        link_selector: String,
        #[serde(default = "default_title_selector")]
        title_selector: String,
        #[serde(default = "default_content_selector")]
        content_selector: String,
        #[serde(default)]
        domains: Vec<String>,
        #[serde(default)]
        max_links: Option<usize>,
    },
    /// A JSON array of raw articles on disk.
    File { name: String, path: PathBuf },
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Html { name, .. } | SourceConfig::File { name, .. } => name,
        }
    }
}

fn default_title_selector() -> String {
    "h1".into()
}
fn default_content_selector() -> String {
    "p".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_valid() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.curation.decay_days, 30.0);
        assert_eq!(config.curation.top_n_per_cluster, 5);
        assert_eq!(config.curation.novelty_mode, NoveltyMode::ClusterBatch);
        assert_eq!(config.scoring.weights, ScoringWeights::default());
        assert_eq!(config.scoring.sources.score("TechCrunch"), 1.0);
        assert_eq!(config.scoring.sources.score("Unknown Blog"), 0.5);
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            [curation]
            decay_days = 7.5
            top_n_per_cluster = 3
            novelty_mode = "centroid_distance"

            [scoring.weights]
            w_similarity = 1.0
            w_novelty = 0.0
            w_recency = 2.0
            w_source = 0.5

            [scoring.sources]
            default_score = 0.2
            [scoring.sources.table]
            "My Blog" = 0.9

            [storage]
            backend = "memory"

            [[sources]]
            kind = "html"
            name = "TechCrunch"
            listing_urls = ["https://techcrunch.com/tag/robotics/"]
            link_selector = "a.loop-card__title-link"
            domains = ["techcrunch.com"]

            [[sources]]
            kind = "file"
            name = "Replay"
            path = "fixtures/articles.json"
        "#;
        let config = AppConfig::from_toml(text).unwrap();
        assert_eq!(config.curation.novelty_mode, NoveltyMode::CentroidDistance);
        assert_eq!(config.scoring.weights.w_recency, 2.0);
        assert_eq!(config.scoring.sources.score("My Blog"), 0.9);
        assert_eq!(config.scoring.sources.score("TechCrunch"), 0.2);
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
        assert_eq!(config.sources.len(), 2);
        match &config.sources[0] {
            SourceConfig::Html { title_selector, content_selector, .. } => {
                assert_eq!(title_selector, "h1");
                assert_eq!(content_selector, "p");
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(AppConfig::from_toml("[curation]\ndecay_days = 0.0").is_err());
        assert!(AppConfig::from_toml("[curation]\ntop_n_per_cluster = 0").is_err());
        assert!(AppConfig::from_toml(
            "[scoring.weights]\nw_similarity = -0.1\nw_novelty = 0.0\nw_recency = 0.0\nw_source = 0.0"
        )
        .is_err());
        assert!(AppConfig::from_toml("[scoring.sources]\ndefault_score = 1.5").is_err());
        assert!(AppConfig::from_toml("[scraping]\ntimeout_secs = 0").is_err());
        assert!(AppConfig::from_toml("[scraping]\ntimeout_secs = 30\nlisting_timeout_secs = 20").is_err());
    }

    #[test]
    fn test_rejects_duplicate_source_names() {
        let text = r#"
            [[sources]]
            kind = "file"
            name = "A"
            path = "a.json"
            [[sources]]
            kind = "file"
            name = "A"
            path = "b.json"
        "#;
        assert!(matches!(AppConfig::from_toml(text), Err(Error::Config(_))));
    }
}
