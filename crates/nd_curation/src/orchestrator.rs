//! The curation run: INIT → COLLECT → FILTER → ENRICH → ASSIGN → SCORE →
//! MERGE → SELECT → DONE, or ABORTED from any stage.
//!
//! Ledger and corpus are loaded once at INIT, threaded through the stages by
//! reference and written back in a single commit at MERGE. A run that aborts
//! before that commit leaves the store exactly as it found it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nd_core::{AppConfig, Corpus, CurationStore, DigestSelection, EmbeddingProvider, Error, Ledger, NormalizedArticle, RawArticle, Result};
use nd_inference::{create_model, Assignment, ClusterAssigner, ClusterModelLoader, EmbeddingGenerator, FileClusterModelLoader};
use nd_scrappers::{Candidate, Normalizer, ScraperManager, StopwordNormalizer};
use nd_storage::create_store;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::merger::merge;
use crate::scoring::{EnrichedArticle, ScoringEngine};
use crate::selector::select;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Init,
    Collect,
    Filter,
    Enrich,
    Assign,
    Score,
    Merge,
    Select,
    Done,
    Aborted,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Init => "INIT",
            RunStage::Collect => "COLLECT",
            RunStage::Filter => "FILTER",
            RunStage::Enrich => "ENRICH",
            RunStage::Assign => "ASSIGN",
            RunStage::Score => "SCORE",
            RunStage::Merge => "MERGE",
            RunStage::Select => "SELECT",
            RunStage::Done => "DONE",
            RunStage::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Articles were merged and a selection produced.
    Completed,
    /// Nothing new to merge. Not an error.
    NoOp { reason: String },
    /// A fatal error stopped the run; nothing was persisted.
    Aborted { stage: RunStage, error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    /// Unique candidate links listed by all sources.
    pub candidates: usize,
    /// Candidates not yet in the ledger.
    pub new_candidates: usize,
    pub fetched: usize,
    /// Fetched articles that passed normalization.
    pub valid: usize,
    /// Valid articles dropped for lack of an embedding.
    pub dropped: usize,
    pub merged: usize,
}

/// What one run did, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub stages: Vec<RunStage>,
    pub outcome: RunOutcome,
    pub counts: RunCounts,
    pub failed_sources: Vec<String>,
    pub recency_degraded: usize,
    pub selection: Option<DigestSelection>,
}

impl RunReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            stages: Vec::new(),
            outcome: RunOutcome::NoOp {
                reason: "not started".into(),
            },
            counts: RunCounts::default(),
            failed_sources: Vec::new(),
            recency_degraded: 0,
            selection: None,
        }
    }

    fn enter(&mut self, stage: RunStage) {
        info!(stage = %stage, "entering stage");
        self.stages.push(stage);
    }

    /// The last stage entered; `Init` before the run starts.
    pub fn final_stage(&self) -> RunStage {
        self.stages.last().copied().unwrap_or(RunStage::Init)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted { .. })
    }
}

enum Flow {
    Completed(DigestSelection),
    NoOp(&'static str),
}

/// Owns the collaborators of a curation run.
pub struct Curator {
    config: AppConfig,
    scrapers: ScraperManager,
    normalizer: Arc<dyn Normalizer>,
    embedder: EmbeddingGenerator,
    model_loader: Box<dyn ClusterModelLoader>,
    store: Arc<dyn CurationStore>,
    engine: ScoringEngine,
}

impl Curator {
    /// A curator with no sources, the default normalizer, the configured
    /// embedding provider and the cluster model file named in the config.
    pub fn new(config: AppConfig, store: Arc<dyn CurationStore>) -> Result<Self> {
        let embedder = EmbeddingGenerator::new(create_model(&config.embedding)?);
        Ok(Self {
            scrapers: ScraperManager::new(&config.scraping),
            normalizer: Arc::new(StopwordNormalizer::new(&config.normalization)),
            model_loader: Box::new(FileClusterModelLoader::new(&config.storage.cluster_model_path)),
            engine: ScoringEngine::new(&config.scoring, &config.curation),
            embedder,
            store,
            config,
        })
    }

    /// Everything from configuration: store, sources and models.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let store = create_store(&config.storage).await?;
        let scrapers = ScraperManager::from_config(&config)?;
        Ok(Self::new(config, store)?.with_scrapers(scrapers))
    }

    pub fn with_scrapers(mut self, scrapers: ScraperManager) -> Self {
        self.scrapers = scrapers;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = EmbeddingGenerator::new(provider);
        self
    }

    pub fn with_model_loader(mut self, loader: impl ClusterModelLoader + 'static) -> Self {
        self.model_loader = Box::new(loader);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scrapers(&self) -> &ScraperManager {
        &self.scrapers
    }

    pub fn store(&self) -> &Arc<dyn CurationStore> {
        &self.store
    }

    /// Executes one run. `now` is the reference time for recency and is used
    /// unchanged for every article of the run.
    pub async fn run(&self, now: DateTime<Utc>) -> RunReport {
        let mut report = RunReport::new(now);
        match self.execute(now, &mut report).await {
            Ok(Flow::Completed(selection)) => {
                info!(
                    merged = report.counts.merged,
                    selected = selection.len(),
                    "run completed"
                );
                report.selection = Some(selection);
                report.outcome = RunOutcome::Completed;
                report.enter(RunStage::Done);
            }
            Ok(Flow::NoOp(reason)) => {
                info!(reason, "nothing to merge");
                report.outcome = RunOutcome::NoOp {
                    reason: reason.to_string(),
                };
                report.enter(RunStage::Done);
            }
            Err(e) => {
                let stage = report.final_stage();
                error!(stage = %stage, error = %e, "run aborted, persisted state unchanged");
                report.outcome = RunOutcome::Aborted {
                    stage,
                    error: e.to_string(),
                };
                report.enter(RunStage::Aborted);
            }
        }
        report
    }

    async fn execute(&self, now: DateTime<Utc>, report: &mut RunReport) -> Result<Flow> {
        report.enter(RunStage::Init);
        let ledger = self.store.load_ledger().await?;
        let corpus = self.store.load_corpus().await?;
        corpus.check_consistent(&ledger)?;
        info!(
            ledger = ledger.len(),
            corpus = corpus.len(),
            sources = self.scrapers.scrapers().len(),
            novelty_mode = ?self.engine.novelty_mode(),
            "state loaded"
        );

        report.enter(RunStage::Collect);
        let collection = self.scrapers.collect().await;
        report.counts.candidates = collection.candidates.len();
        for source in &collection.failed_sources {
            warn!(source = %source, "source contributed no links this run");
        }
        report.failed_sources = collection.failed_sources;

        report.enter(RunStage::Filter);
        let new: Vec<Candidate> = collection
            .candidates
            .into_iter()
            .filter(|c| !ledger.contains(&c.url))
            .collect();
        report.counts.new_candidates = new.len();
        if new.is_empty() {
            return Ok(Flow::NoOp("no new urls"));
        }
        let fetched = self.scrapers.fetch_all(&new).await;
        report.counts.fetched = fetched.articles.len();
        let valid = self.admit(fetched.articles, &ledger, &corpus);
        report.counts.valid = valid.len();
        if valid.is_empty() {
            return Ok(Flow::NoOp("no valid articles"));
        }

        report.enter(RunStage::Enrich);
        let model = Arc::new(self.model_loader.load().await?);
        let assigner = ClusterAssigner::new(model.clone())?;
        let embeddings = self.embedder.embed_articles(&valid).await?;

        report.enter(RunStage::Assign);
        let mut enriched = Vec::with_capacity(valid.len());
        for (article, embedding) in valid.into_iter().zip(embeddings) {
            let assignment = match assign(&assigner, &article, &embedding) {
                Ok(assignment) => Some(assignment),
                // left unassigned, SCORE drops it
                Err(e) if !e.is_fatal() => {
                    debug!(error = %e, "article has no usable embedding");
                    None
                }
                Err(e) => return Err(e),
            };
            enriched.push(EnrichedArticle {
                article,
                embedding,
                assignment,
            });
        }

        report.enter(RunStage::Score);
        let scored = self.engine.score(enriched, now);
        report.counts.dropped = scored.dropped.len();
        report.recency_degraded = scored.recency_degraded;
        if scored.articles.is_empty() {
            return Ok(Flow::NoOp("every article lacked an embedding"));
        }

        report.enter(RunStage::Merge);
        let merged = merge(&ledger, &corpus, scored.articles)?;
        self.store
            .commit(&merged.ledger, &merged.corpus, &merged.appended)
            .await?;
        report.counts.merged = merged.appended.len();

        report.enter(RunStage::Select);
        let mut selection = select(&merged.corpus, self.config.curation.top_n_per_cluster, Some(now));
        selection.label_clusters(model.names());
        Ok(Flow::Completed(selection))
    }

    /// Normalizes fetched articles and keeps the valid ones. An article whose
    /// final URL is already known, or repeats one earlier in the batch, is
    /// skipped so the merger only ever sees fresh URLs.
    fn admit(&self, fetched: Vec<RawArticle>, ledger: &Ledger, corpus: &Corpus) -> Vec<NormalizedArticle> {
        let mut seen = HashSet::new();
        let mut admitted = Vec::with_capacity(fetched.len());
        for raw in fetched {
            if ledger.contains(&raw.url) || corpus.contains(&raw.url) || !seen.insert(raw.url.clone()) {
                warn!(url = %raw.url, "fetched article resolves to a known url, skipping");
                continue;
            }
            let normalized = self.normalizer.normalize(raw);
            if !normalized.is_valid {
                debug!(
                    url = %normalized.raw.url,
                    language = %normalized.language,
                    words = normalized.word_count,
                    "article failed normalization"
                );
                continue;
            }
            admitted.push(normalized);
        }
        admitted
    }
}

/// Assigns one article. An empty or non-finite embedding is a per-article
/// gap reported as `MissingEmbedding`; a dimension mismatch is fatal.
fn assign(assigner: &ClusterAssigner, article: &NormalizedArticle, embedding: &[f32]) -> Result<Assignment> {
    if embedding.is_empty() || embedding.iter().any(|x| !x.is_finite()) {
        return Err(Error::MissingEmbedding {
            url: article.raw.url.clone(),
        });
    }
    assigner.assign(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(RunStage::Collect.to_string(), "COLLECT");
        assert_eq!(RunStage::Aborted.to_string(), "ABORTED");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = RunOutcome::Aborted {
            stage: RunStage::Enrich,
            error: "boom".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["stage"], "enrich");
    }

    #[test]
    fn test_report_tracks_current_stage() {
        let mut report = RunReport::new(Utc::now());
        assert_eq!(report.final_stage(), RunStage::Init);
        report.enter(RunStage::Init);
        report.enter(RunStage::Collect);
        assert_eq!(report.final_stage(), RunStage::Collect);
        assert!(!report.is_aborted());
    }
}
