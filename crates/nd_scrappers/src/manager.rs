use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use nd_core::config::ScrapingConfig;
use nd_core::{AppConfig, Error, RawArticle, Result};

use crate::logging::Logger;
use crate::scrapers::{build_scrapers, Scraper};

type SharedScraper = Arc<dyn Scraper>;

/// A candidate link and the index of the source that listed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub source_index: usize,
}

/// Result of listing every source once.
#[derive(Debug, Default)]
pub struct Collection {
    /// Unique candidates, in source registration order then listing order.
    pub candidates: Vec<Candidate>,
    /// Names of sources that failed or timed out this run.
    pub failed_sources: Vec<String>,
}

/// Result of fetching a set of candidates.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Fetched articles, in candidate order.
    pub articles: Vec<RawArticle>,
    pub failed: usize,
    pub empty: usize,
}

pub struct ScraperManager {
    scrapers: Vec<SharedScraper>,
    timeout: Duration,
    listing_timeout: Duration,
    max_concurrency: usize,
}

impl ScraperManager {
    pub fn new(config: &ScrapingConfig) -> Self {
        Self {
            scrapers: Vec::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            listing_timeout: Duration::from_secs(config.listing_timeout_secs),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Builds the HTTP client and every configured source.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.scraping.timeout_secs))
            .user_agent(config.scraping.user_agent.clone())
            .build()?;
        let mut manager = Self::new(&config.scraping);
        for scraper in build_scrapers(&config.sources, client)? {
            manager.add_scraper(scraper);
        }
        Ok(manager)
    }

    pub fn add_scraper(&mut self, scraper: SharedScraper) {
        self.scrapers.push(scraper);
    }

    pub fn scrapers(&self) -> &[SharedScraper] {
        &self.scrapers
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }

    /// Lists every source concurrently. A source that errors or exceeds the
    /// listing timeout contributes no links; the others are unaffected.
    /// Individual pages are bounded by the HTTP client's own timeout.
    pub async fn collect(&self) -> Collection {
        let listings = self.scrapers.iter().map(|scraper| {
            let scraper = scraper.clone();
            let timeout = self.listing_timeout;
            async move {
                let logger = Logger::new().with_prefix(format!("[{}]", scraper.source()));
                match tokio::time::timeout(timeout, scraper.list_candidate_urls()).await {
                    Ok(Ok(urls)) => {
                        logger.info(&format!("listed {} links", urls.len()));
                        Some(urls)
                    }
                    Ok(Err(e)) => {
                        logger.error(&format!("listing failed: {}", e));
                        None
                    }
                    Err(_) => {
                        logger.error(&format!("listing timed out after {:?}", timeout));
                        None
                    }
                }
            }
        });

        // join_all keeps the input order, so the merge below is deterministic
        let results = join_all(listings).await;

        let mut collection = Collection::default();
        let mut seen = std::collections::HashSet::new();
        for (source_index, result) in results.into_iter().enumerate() {
            match result {
                Some(urls) => {
                    for url in urls {
                        if seen.insert(url.clone()) {
                            collection.candidates.push(Candidate { url, source_index });
                        }
                    }
                }
                None => collection
                    .failed_sources
                    .push(self.scrapers[source_index].source().to_string()),
            }
        }
        collection
    }

    fn scraper_for(&self, candidate: &Candidate) -> Result<&SharedScraper> {
        self.scrapers
            .get(candidate.source_index)
            .or_else(|| self.scrapers.iter().find(|s| s.can_handle(&candidate.url)))
            .ok_or_else(|| Error::Scraping(format!("No scraper found for URL: {}", candidate.url)))
    }

    /// Fetches candidates with bounded concurrency. Failures, timeouts and
    /// empty pages are logged and skipped.
    pub async fn fetch_all(&self, candidates: &[Candidate]) -> FetchOutcome {
        let timeout = self.timeout;
        let results: Vec<Result<Option<RawArticle>>> = stream::iter(candidates.iter())
            .map(|candidate| async move {
                let scraper = match self.scraper_for(candidate) {
                    Ok(scraper) => scraper.clone(),
                    Err(e) => return Err(e),
                };
                match tokio::time::timeout(timeout, scraper.fetch(&candidate.url)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Scraping(format!("timed out after {:?}", timeout))),
                }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut outcome = FetchOutcome::default();
        for (candidate, result) in candidates.iter().zip(results) {
            match result {
                Ok(Some(article)) => outcome.articles.push(article),
                Ok(None) => {
                    tracing::debug!(url = %candidate.url, "no article content");
                    outcome.empty += 1;
                }
                Err(e) => {
                    tracing::warn!(url = %candidate.url, error = %e, "fetch failed");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    pub fn list_sources(&self) -> Vec<&str> {
        self.scrapers.iter().map(|s| s.source()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticScraper {
        name: &'static str,
        urls: Vec<&'static str>,
        fail: bool,
        delay: Option<Duration>,
        pages: u32,
    }

    impl StaticScraper {
        fn new(name: &'static str, urls: Vec<&'static str>) -> Self {
            Self { name, urls, fail: false, delay: None, pages: 1 }
        }
    }

    #[async_trait]
    impl Scraper for StaticScraper {
        fn source(&self) -> &str {
            self.name
        }

        fn can_handle(&self, url: &str) -> bool {
            self.urls.contains(&url)
        }

        async fn list_candidate_urls(&self) -> Result<Vec<String>> {
            // one delay per listing page
            if let Some(delay) = self.delay {
                for _ in 0..self.pages {
                    tokio::time::sleep(delay).await;
                }
            }
            if self.fail {
                return Err(Error::Scraping("boom".into()));
            }
            Ok(self.urls.iter().map(|u| u.to_string()).collect())
        }

        async fn fetch(&self, url: &str) -> Result<Option<RawArticle>> {
            if url.ends_with("empty") {
                return Ok(None);
            }
            if url.ends_with("broken") {
                return Err(Error::Scraping("bad html".into()));
            }
            Ok(Some(RawArticle {
                url: url.to_string(),
                title: format!("Title of {}", url),
                content: "body".into(),
                source: self.name.to_string(),
                scraping_date: None,
            }))
        }
    }

    fn manager(timeout_secs: u64) -> ScraperManager {
        ScraperManager::new(&ScrapingConfig {
            timeout_secs,
            listing_timeout_secs: timeout_secs,
            max_concurrency: 2,
            ..ScrapingConfig::default()
        })
    }

    #[tokio::test]
    async fn test_collect_isolates_failing_source() {
        let mut m = manager(5);
        m.add_scraper(Arc::new(StaticScraper::new("A", vec!["https://a/1", "https://a/2"])));
        m.add_scraper(Arc::new(StaticScraper {
            fail: true,
            ..StaticScraper::new("B", vec!["https://b/1"])
        }));
        m.add_scraper(Arc::new(StaticScraper::new("C", vec!["https://a/2", "https://c/1"])));

        let collection = m.collect().await;
        let urls: Vec<&str> = collection.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/1", "https://a/2", "https://c/1"]);
        assert_eq!(collection.candidates[2].source_index, 2);
        assert_eq!(collection.failed_sources, vec!["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_timeout_counts_as_zero_links() {
        let mut m = manager(1);
        m.add_scraper(Arc::new(StaticScraper {
            delay: Some(Duration::from_secs(30)),
            ..StaticScraper::new("Slow", vec!["https://slow/1"])
        }));
        m.add_scraper(Arc::new(StaticScraper::new("Fast", vec!["https://fast/1"])));

        let collection = m.collect().await;
        assert_eq!(collection.candidates.len(), 1);
        assert_eq!(collection.candidates[0].url, "https://fast/1");
        assert_eq!(collection.failed_sources, vec!["Slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_page_listing_gets_whole_listing_budget() {
        let mut m = ScraperManager::new(&ScrapingConfig::default());
        m.add_scraper(Arc::new(StaticScraper {
            delay: Some(Duration::from_secs(4)),
            pages: 3,
            ..StaticScraper::new("Paged", vec!["https://p/1", "https://p/2", "https://p/3"])
        }));

        let collection = m.collect().await;
        assert_eq!(collection.candidates.len(), 3);
        assert!(collection.failed_sources.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_skips_failures_and_keeps_order() {
        let mut m = manager(5);
        m.add_scraper(Arc::new(StaticScraper::new(
            "A",
            vec!["https://a/1", "https://a/empty", "https://a/broken", "https://a/2"],
        )));
        let candidates: Vec<Candidate> = ["https://a/1", "https://a/empty", "https://a/broken", "https://a/2"]
            .into_iter()
            .map(|url| Candidate { url: url.into(), source_index: 0 })
            .collect();

        let outcome = m.fetch_all(&candidates).await;
        let urls: Vec<&str> = outcome.articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/1", "https://a/2"]);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.empty, 1);
    }
}
