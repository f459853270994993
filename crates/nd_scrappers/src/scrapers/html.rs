use async_trait::async_trait;
use chrono::Utc;
use nd_core::{Error, RawArticle, Result};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use super::{utils, Scraper};

/// A configuration-driven scraper: listing pages yield article links through
/// a CSS selector, and article pages yield title and body the same way.
#[derive(Debug, Clone)]
pub struct HtmlScraper {
    name: String,
    client: Client,
    listing_urls: Vec<String>,
    link_selector: Selector,
    title_selector: Selector,
    content_selector: Selector,
    domains: Vec<String>,
    max_links: Option<usize>,
}

pub struct HtmlScraperBuilder {
    name: String,
    client: Client,
    listing_urls: Vec<String>,
    selectors: Option<(Selector, Selector, Selector)>,
    domains: Vec<String>,
    max_links: Option<usize>,
}

impl HtmlScraperBuilder {
    pub fn listing_urls(mut self, urls: Vec<String>) -> Self {
        self.listing_urls = urls;
        self
    }

    pub fn selectors(mut self, link: &str, title: &str, content: &str) -> Result<Self> {
        self.selectors = Some((
            utils::parse_selector(link)?,
            utils::parse_selector(title)?,
            utils::parse_selector(content)?,
        ));
        Ok(self)
    }

    pub fn domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    pub fn max_links(mut self, max_links: Option<usize>) -> Self {
        self.max_links = max_links;
        self
    }

    pub fn build(self) -> Result<HtmlScraper> {
        let (link_selector, title_selector, content_selector) = self
            .selectors
            .ok_or_else(|| Error::Config(format!("source {} has no selectors", self.name)))?;
        for listing in &self.listing_urls {
            utils::parse_url(listing).map_err(|e| Error::Config(e.to_string()))?;
        }
        Ok(HtmlScraper {
            name: self.name,
            client: self.client,
            listing_urls: self.listing_urls,
            link_selector,
            title_selector,
            content_selector,
            domains: self.domains,
            max_links: self.max_links,
        })
    }
}

impl HtmlScraper {
    pub fn builder(name: &str, client: Client) -> HtmlScraperBuilder {
        HtmlScraperBuilder {
            name: name.to_string(),
            client,
            listing_urls: Vec::new(),
            selectors: None,
            domains: Vec::new(),
            max_links: None,
        }
    }

    /// Downloads a page. `Ok(None)` for 410 Gone, which some sites use to
    /// mark the end of pagination.
    async fn get_page(&self, url: &str) -> Result<Option<String>> {
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::GONE {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.text().await?))
    }

    fn extract_links(&self, base: &Url, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.link_selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .map(|mut u| {
                u.set_fragment(None);
                u.to_string()
            })
            .filter(|u| self.can_handle(u))
            .collect()
    }

    fn extract_article(&self, url: &str, html: &str) -> Option<RawArticle> {
        let document = Html::parse_document(html);
        let title = utils::extract_text(&document, &self.title_selector)?;
        let content = utils::extract_texts(&document, &self.content_selector).join(" ");
        if content.is_empty() {
            return None;
        }
        Some(RawArticle {
            url: url.to_string(),
            title,
            content,
            source: self.name.clone(),
            scraping_date: Some(Utc::now()),
        })
    }
}

#[async_trait]
impl Scraper for HtmlScraper {
    fn source(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, url: &str) -> bool {
        utils::host_matches(url, &self.domains)
    }

    async fn list_candidate_urls(&self) -> Result<Vec<String>> {
        let mut links = Vec::new();
        for listing in &self.listing_urls {
            let base = utils::parse_url(listing)?;
            let Some(html) = self.get_page(listing).await? else {
                info!(source = %self.name, listing = %listing, "listing gone, stopping");
                break;
            };
            let found = self.extract_links(&base, &html);
            debug!(source = %self.name, listing = %listing, count = found.len(), "listing parsed");
            links.extend(found);
        }
        let mut links = utils::dedup_preserving_order(links);
        if let Some(max) = self.max_links {
            links.truncate(max);
        }
        Ok(links)
    }

    async fn fetch(&self, url: &str) -> Result<Option<RawArticle>> {
        match self.get_page(url).await? {
            Some(html) => Ok(self.extract_article(url, &html)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> HtmlScraper {
        HtmlScraper::builder("TechCrunch", Client::new())
            .listing_urls(vec!["https://techcrunch.com/tag/robotics/".into()])
            .selectors("a.title-link", "h1", "article p")
            .unwrap()
            .domains(vec!["techcrunch.com".into()])
            .build()
            .unwrap()
    }

    #[test]
    fn test_extract_links() {
        let html = r#"
            <a class="title-link" href="/2024/05/01/robots/">Robots</a>
            <a class="title-link" href="https://techcrunch.com/2024/05/02/ai/#comments">AI</a>
            <a class="title-link" href="https://elsewhere.com/story">Elsewhere</a>
            <a class="other" href="/2024/05/03/skip/">Skip</a>
        "#;
        let s = scraper();
        let base = Url::parse("https://techcrunch.com/tag/robotics/").unwrap();
        assert_eq!(
            s.extract_links(&base, html),
            vec![
                "https://techcrunch.com/2024/05/01/robots/",
                "https://techcrunch.com/2024/05/02/ai/",
            ]
        );
    }

    #[test]
    fn test_extract_article() {
        let html = r#"
            <html><body>
              <h1> Robots are
                 coming </h1>
              <article><p>First paragraph.</p><p>Second   paragraph.</p></article>
              <footer><p>Not content</p></footer>
            </body></html>
        "#;
        let article = scraper()
            .extract_article("https://techcrunch.com/a", html)
            .unwrap();
        assert_eq!(article.title, "Robots are coming");
        assert_eq!(article.content, "First paragraph. Second paragraph.");
        assert_eq!(article.source, "TechCrunch");
        assert!(article.scraping_date.is_some());
    }

    #[test]
    fn test_extract_article_without_body() {
        let html = "<h1>Only a title</h1>";
        assert!(scraper().extract_article("https://techcrunch.com/a", html).is_none());
    }

    #[test]
    fn test_builder_requires_selectors() {
        let result = HtmlScraper::builder("x", Client::new()).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
