//! The scoring engine: source, recency and novelty sub-scores combined into a
//! weighted final score.
//!
//! Every function here is pure. The only time-dependent input is `now`, which
//! the caller captures once per run, so a batch scored twice with the same
//! inputs yields bit-identical scores.

use chrono::{DateTime, Utc};
use nd_core::config::{CurationConfig, ScoringConfig};
use nd_core::{cosine_similarity, Article, Error, NormalizedArticle, NoveltyMode, Result, ScoringWeights, SourceScores};
use nd_inference::Assignment;
use tracing::{debug, warn};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// `exp(-age_days / decay_days)`, with negative ages (clock skew) clamped to
/// zero. A missing date is maximally stale and scores `0.0`; a dated article
/// never underflows below `f64::MIN_POSITIVE`, so it always outranks one with
/// no date at all.
pub fn recency_score(scraping_date: Option<DateTime<Utc>>, now: DateTime<Utc>, decay_days: f64) -> f64 {
    let Some(date) = scraping_date else {
        return 0.0;
    };
    let age_secs = (now - date).num_milliseconds() as f64 / 1000.0;
    let age_days = age_secs.max(0.0) / SECONDS_PER_DAY;
    (-age_days / decay_days).exp().max(f64::MIN_POSITIVE)
}

/// `1 - mean cosine similarity` of each embedding to the other members of its
/// cluster within the batch. Self-similarity is excluded; the sole member of a
/// singleton cluster gets `0.0`.
pub fn cluster_batch_novelty(embeddings: &[&[f32]], clusters: &[usize]) -> Vec<f64> {
    debug_assert_eq!(embeddings.len(), clusters.len());
    (0..embeddings.len())
        .map(|i| {
            let mut total = 0.0f64;
            let mut peers = 0usize;
            for j in 0..embeddings.len() {
                if j != i && clusters[j] == clusters[i] {
                    total += cosine_similarity(embeddings[i], embeddings[j]);
                    peers += 1;
                }
            }
            if peers == 0 {
                0.0
            } else {
                1.0 - total / peers as f64
            }
        })
        .collect()
}

/// Novelty as distance from the assigned centroid, usable one article at a
/// time.
pub fn centroid_distance_novelty(similarity_to_centroid: f64) -> f64 {
    1.0 - similarity_to_centroid
}

/// Weighted sum of the four sub-scores, always added in the same order.
pub fn final_score(
    weights: &ScoringWeights,
    similarity_to_centroid: f64,
    novelty: f64,
    recency: f64,
    source: f64,
) -> f64 {
    weights.w_similarity * similarity_to_centroid
        + weights.w_novelty * novelty
        + weights.w_recency * recency
        + weights.w_source * source
}

/// A normalized article after ENRICH and ASSIGN. `assignment` is `None` when
/// the provider returned no embedding for it.
#[derive(Debug, Clone)]
pub struct EnrichedArticle {
    pub article: NormalizedArticle,
    pub embedding: Vec<f32>,
    pub assignment: Option<Assignment>,
}

/// Output of scoring one batch.
#[derive(Debug, Default)]
pub struct ScoredBatch {
    pub articles: Vec<Article>,
    /// URLs dropped because they had no embedding.
    pub dropped: Vec<String>,
    /// Articles whose recency fell back to the stale default.
    pub recency_degraded: usize,
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: ScoringWeights,
    sources: SourceScores,
    decay_days: f64,
    novelty_mode: NoveltyMode,
}

impl ScoringEngine {
    pub fn new(scoring: &ScoringConfig, curation: &CurationConfig) -> Self {
        Self {
            weights: scoring.weights,
            sources: scoring.sources.clone(),
            decay_days: curation.decay_days,
            novelty_mode: curation.novelty_mode,
        }
    }

    pub fn novelty_mode(&self) -> NoveltyMode {
        self.novelty_mode
    }

    pub fn source_score(&self, source: &str) -> f64 {
        self.sources.score(source)
    }

    /// Scores a batch. Articles without an embedding are dropped with a
    /// warning; the rest keep their input order.
    pub fn score(&self, batch: Vec<EnrichedArticle>, now: DateTime<Utc>) -> ScoredBatch {
        let mut result = ScoredBatch::default();

        let mut ready = Vec::with_capacity(batch.len());
        for enriched in batch {
            match require_assignment(&enriched) {
                Ok(assignment) => ready.push((enriched, assignment)),
                Err(e) => {
                    warn!(error = %e, "dropping article");
                    result.dropped.push(enriched.article.raw.url);
                }
            }
        }

        let novelty = match self.novelty_mode {
            NoveltyMode::ClusterBatch => {
                let embeddings: Vec<&[f32]> = ready.iter().map(|(e, _)| e.embedding.as_slice()).collect();
                let clusters: Vec<usize> = ready.iter().map(|(_, a)| a.cluster).collect();
                cluster_batch_novelty(&embeddings, &clusters)
            }
            NoveltyMode::CentroidDistance => ready
                .iter()
                .map(|(_, a)| centroid_distance_novelty(a.similarity))
                .collect(),
        };

        for ((enriched, assignment), novelty_score) in ready.into_iter().zip(novelty) {
            if enriched.article.raw.scraping_date.is_none() {
                warn!(url = %enriched.article.raw.url, "no scraping date, recency set to stale default");
                result.recency_degraded += 1;
            }
            let article = self.build(enriched, assignment, novelty_score, now);
            debug!(url = %article.url, cluster = article.cluster, final_score = article.final_score, "scored");
            result.articles.push(article);
        }
        result
    }

    fn build(&self, enriched: EnrichedArticle, assignment: Assignment, novelty_score: f64, now: DateTime<Utc>) -> Article {
        let EnrichedArticle { article, embedding, .. } = enriched;
        let raw = article.raw;
        let source_score = self.source_score(&raw.source);
        let recency_score = recency_score(raw.scraping_date, now, self.decay_days);
        let final_score = final_score(
            &self.weights,
            assignment.similarity,
            novelty_score,
            recency_score,
            source_score,
        );
        Article {
            url: raw.url,
            title: raw.title,
            content: raw.content,
            source: raw.source,
            scraping_date: raw.scraping_date,
            language: article.language,
            word_count: article.word_count,
            is_valid: article.is_valid,
            embedding,
            cluster: assignment.cluster,
            similarity_to_centroid: assignment.similarity,
            source_score,
            novelty_score,
            recency_score,
            final_score,
        }
    }
}

/// An article is scoreable only with a non-empty, finite embedding and a
/// finite similarity.
fn require_assignment(enriched: &EnrichedArticle) -> Result<Assignment> {
    let usable = !enriched.embedding.is_empty() && enriched.embedding.iter().all(|x| x.is_finite());
    match enriched.assignment {
        Some(assignment) if usable && assignment.similarity.is_finite() => Ok(assignment),
        _ => Err(Error::MissingEmbedding {
            url: enriched.article.raw.url.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use nd_core::config::{CurationConfig, ScoringConfig};
    use nd_core::RawArticle;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn enriched(url: &str, source: &str, embedding: Vec<f32>, cluster: usize, similarity: f64) -> EnrichedArticle {
        let assignment = (!embedding.is_empty()).then_some(Assignment { cluster, similarity });
        EnrichedArticle {
            article: NormalizedArticle {
                raw: RawArticle {
                    url: url.to_string(),
                    title: "t".to_string(),
                    content: "c".to_string(),
                    source: source.to_string(),
                    scraping_date: Some(now() - Duration::days(3)),
                },
                language: "en".to_string(),
                word_count: 200,
                is_valid: true,
            },
            embedding,
            assignment,
        }
    }

    #[test]
    fn test_recency_score() {
        assert_eq!(recency_score(Some(now()), now(), 30.0), 1.0);
        let month = recency_score(Some(now() - Duration::days(30)), now(), 30.0);
        assert!((month - (-1.0f64).exp()).abs() < 1e-12);
        // fractional days count
        let half_day = recency_score(Some(now() - Duration::hours(12)), now(), 30.0);
        assert!((half_day - (-0.5f64 / 30.0).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_recency_future_date_clamped() {
        assert_eq!(recency_score(Some(now() + Duration::days(2)), now(), 30.0), 1.0);
    }

    #[test]
    fn test_recency_missing_date_is_stale() {
        assert_eq!(recency_score(None, now(), 30.0), 0.0);
    }

    #[test]
    fn test_recency_ancient_date_stays_positive() {
        let ancient = recency_score(Some(now() - Duration::days(365 * 100)), now(), 1.0);
        assert!(ancient > 0.0);
        assert!(ancient > recency_score(None, now(), 1.0));
    }

    #[test]
    fn test_cluster_batch_novelty() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let c = [1.0f32, 1.0];
        let novelty = cluster_batch_novelty(&[&a, &b, &c], &[0, 0, 1]);
        // a and b are orthogonal: mean similarity 0 to each other
        assert_eq!(novelty[0], 1.0);
        assert_eq!(novelty[1], 1.0);
        // singleton cluster
        assert_eq!(novelty[2], 0.0);
    }

    #[test]
    fn test_cluster_batch_novelty_excludes_self() {
        let a = [1.0f32, 0.0];
        let novelty = cluster_batch_novelty(&[&a, &a, &a], &[3, 3, 3]);
        assert!(novelty.iter().all(|n| n.abs() < 1e-12));
    }

    #[test]
    fn test_final_score_is_weighted_sum() {
        let weights = ScoringWeights {
            w_similarity: 0.4,
            w_novelty: 0.3,
            w_recency: 0.2,
            w_source: 0.1,
        };
        let score = final_score(&weights, 0.9, 0.1, 0.5, 1.0);
        assert!((score - (0.36 + 0.03 + 0.1 + 0.1)).abs() < 1e-12);

        let zero = ScoringWeights {
            w_similarity: 0.0,
            w_novelty: 0.0,
            w_recency: 0.0,
            w_source: 0.0,
        };
        assert_eq!(final_score(&zero, 0.9, 0.1, 0.5, 1.0), 0.0);
    }

    #[test]
    fn test_engine_scores_batch() {
        let engine = ScoringEngine::new(&ScoringConfig::default(), &CurationConfig::default());
        let batch = vec![
            enriched("https://a", "TechCrunch", vec![1.0, 0.0], 0, 0.8),
            enriched("https://b", "Unknown Blog", vec![0.6, 0.8], 0, 0.7),
        ];
        let scored = engine.score(batch, now());
        assert_eq!(scored.articles.len(), 2);
        assert!(scored.dropped.is_empty());

        let a = &scored.articles[0];
        assert_eq!(a.source_score, 1.0);
        assert_eq!(scored.articles[1].source_score, 0.5);
        assert!((a.novelty_score - 0.4).abs() < 1e-6);
        assert!((a.recency_score - (-0.1f64).exp()).abs() < 1e-12);
        let expected = 0.4 * 0.8 + 0.3 * a.novelty_score + 0.2 * a.recency_score + 0.1 * 1.0;
        assert_eq!(a.final_score, expected);
    }

    #[test]
    fn test_engine_centroid_mode() {
        let curation = CurationConfig {
            novelty_mode: NoveltyMode::CentroidDistance,
            ..CurationConfig::default()
        };
        let engine = ScoringEngine::new(&ScoringConfig::default(), &curation);
        let scored = engine.score(vec![enriched("https://a", "x", vec![1.0, 0.0], 2, 0.75)], now());
        assert_eq!(scored.articles[0].novelty_score, 0.25);
        assert_eq!(scored.articles[0].cluster, 2);
    }

    #[test]
    fn test_engine_drops_missing_embedding() {
        let engine = ScoringEngine::new(&ScoringConfig::default(), &CurationConfig::default());
        let scored = engine.score(
            vec![
                enriched("https://a", "x", vec![], 0, 0.0),
                enriched("https://b", "x", vec![1.0, 0.0], 0, 1.0),
            ],
            now(),
        );
        assert_eq!(scored.dropped, vec!["https://a".to_string()]);
        assert_eq!(scored.articles.len(), 1);
        // b is now alone in its cluster
        assert_eq!(scored.articles[0].novelty_score, 0.0);
    }

    #[test]
    fn test_engine_drops_non_finite_embedding() {
        let engine = ScoringEngine::new(&ScoringConfig::default(), &CurationConfig::default());
        let scored = engine.score(
            vec![
                enriched("https://nan", "x", vec![f32::NAN, 1.0], 0, 0.5),
                enriched("https://b", "x", vec![1.0, 0.0], 0, f64::NAN),
                enriched("https://c", "x", vec![1.0, 0.0], 0, 1.0),
            ],
            now(),
        );
        assert_eq!(scored.dropped, vec!["https://nan".to_string(), "https://b".to_string()]);
        assert_eq!(scored.articles.len(), 1);
        assert!(scored.articles[0].final_score.is_finite());
    }

    #[test]
    fn test_engine_missing_date_still_scored() {
        let engine = ScoringEngine::new(&ScoringConfig::default(), &CurationConfig::default());
        let mut item = enriched("https://a", "x", vec![1.0, 0.0], 0, 1.0);
        item.article.raw.scraping_date = None;
        let scored = engine.score(vec![item], now());
        assert_eq!(scored.recency_degraded, 1);
        assert_eq!(scored.articles[0].recency_score, 0.0);
        assert!(scored.articles[0].final_score.is_finite());
    }

    #[test]
    fn test_engine_is_deterministic() {
        let engine = ScoringEngine::new(&ScoringConfig::default(), &CurationConfig::default());
        let batch = || {
            vec![
                enriched("https://a", "Xataka", vec![0.3, 0.7, 0.1], 1, 0.61),
                enriched("https://b", "Wired ES", vec![0.2, 0.9, 0.4], 1, 0.83),
                enriched("https://c", "TechCrunch", vec![0.9, 0.1, 0.0], 0, 0.95),
            ]
        };
        let first = engine.score(batch(), now());
        let second = engine.score(batch(), now());
        assert_eq!(first.articles, second.articles);
    }
}
