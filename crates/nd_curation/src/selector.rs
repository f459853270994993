use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use nd_core::{Article, ClusterDigest, Corpus, DigestSelection};

/// Total order used to rank articles inside a cluster: `final_score`
/// descending with non-finite scores last, then `scraping_date` descending
/// (undated last), then `url` ascending.
pub fn rank(a: &Article, b: &Article) -> Ordering {
    b.final_score
        .is_finite()
        .cmp(&a.final_score.is_finite())
        .then_with(|| b.final_score.total_cmp(&a.final_score))
        .then_with(|| match (a.scraping_date, b.scraping_date) {
            (Some(da), Some(db)) => db.cmp(&da),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.url.cmp(&b.url))
}

/// Top `top_n` articles of every cluster present in `corpus`, clusters in
/// ascending id order. Read-only; the same corpus always yields the same
/// selection.
pub fn select(corpus: &Corpus, top_n: usize, generated_at: Option<DateTime<Utc>>) -> DigestSelection {
    let clusters = corpus
        .clusters()
        .into_iter()
        .map(|cluster| {
            let mut members: Vec<&Article> = corpus.articles().iter().filter(|a| a.cluster == cluster).collect();
            members.sort_by(|a, b| rank(a, b));
            ClusterDigest {
                cluster,
                name: None,
                articles: members.into_iter().take(top_n).cloned().collect(),
            }
        })
        .collect();

    DigestSelection {
        generated_at,
        top_n_per_cluster: top_n,
        clusters,
    }
}
