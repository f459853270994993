use std::sync::Arc;

use async_trait::async_trait;
use nd_core::{Error, RawArticle, Result, SourceConfig};

pub mod file;
pub mod html;

pub use file::FileScraper;
pub use html::HtmlScraper;

/// One article source.
///
/// Implementations are independent of each other; the pipeline only ever
/// holds them as `dyn Scraper`.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Returns the name of the news source, as used for source scoring
    fn source(&self) -> &str;

    /// Returns true if this scraper can fetch the given URL
    fn can_handle(&self, url: &str) -> bool;

    /// Returns the article URLs currently listed by the source
    async fn list_candidate_urls(&self) -> Result<Vec<String>>;

    /// Fetches one article. `Ok(None)` means the page exists but holds no
    /// usable article.
    async fn fetch(&self, url: &str) -> Result<Option<RawArticle>>;
}

/// Builds one scraper per configured source, in configuration order.
pub fn build_scrapers(sources: &[SourceConfig], client: reqwest::Client) -> Result<Vec<Arc<dyn Scraper>>> {
    sources
        .iter()
        .map(|source| -> Result<Arc<dyn Scraper>> {
            match source {
                SourceConfig::Html {
                    name,
                    listing_urls,
                    link_selector,
                    title_selector,
                    content_selector,
                    domains,
                    max_links,
                } => Ok(Arc::new(
                    HtmlScraper::builder(name, client.clone())
                        .listing_urls(listing_urls.clone())
                        .selectors(link_selector, title_selector, content_selector)?
                        .domains(domains.clone())
                        .max_links(*max_links)
                        .build()?,
                )),
                SourceConfig::File { name, path } => Ok(Arc::new(FileScraper::new(name, path))),
            }
        })
        .collect()
}

/// Common utilities for scrapers
pub(crate) mod utils {
    use super::*;
    use scraper::{ElementRef, Html, Selector};
    use url::Url;

    pub fn parse_url(url: &str) -> Result<Url> {
        Url::parse(url).map_err(|e| Error::Scraping(format!("Failed to parse URL {}: {}", url, e)))
    }

    pub fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector).map_err(|e| Error::Config(format!("Invalid selector {:?}: {:?}", selector, e)))
    }

    /// Whitespace-normalised text of one element.
    pub fn element_text(el: ElementRef<'_>) -> String {
        el.text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn extract_text(document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .map(element_text)
            .find(|t| !t.is_empty())
    }

    pub fn extract_texts(document: &Html, selector: &Selector) -> Vec<String> {
        document
            .select(selector)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// True when the URL's host ends with one of `domains`. An empty domain
    /// list accepts any http(s) URL.
    pub fn host_matches(url: &str, domains: &[String]) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        domains.is_empty()
            || domains.iter().any(|d| {
                let d = d.to_ascii_lowercase();
                host == d || host.ends_with(&format!(".{}", d))
            })
    }

    /// Drops repeated entries, keeping the first occurrence.
    pub fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        items.into_iter().filter(|i| seen.insert(i.clone())).collect()
    }
}
