use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use nd_core::{RawArticle, Result};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::warn;

use super::Scraper;

/// On-disk shape of one record. Dates stay strings so that a single
/// malformed value degrades that article instead of failing the file.
#[derive(Debug, Deserialize)]
struct FileRecord {
    url: String,
    title: String,
    content: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    scraping_date: Option<String>,
}

/// Replays articles from a JSON array on disk.
pub struct FileScraper {
    name: String,
    path: PathBuf,
    records: OnceCell<(Vec<String>, HashMap<String, RawArticle>)>,
}

impl FileScraper {
    pub fn new(name: &str, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
            records: OnceCell::new(),
        }
    }

    async fn records(&self) -> Result<&(Vec<String>, HashMap<String, RawArticle>)> {
        self.records
            .get_or_try_init(|| async {
                let text = tokio::fs::read_to_string(&self.path).await?;
                let rows: Vec<FileRecord> = serde_json::from_str(&text)?;
                let mut order = Vec::with_capacity(rows.len());
                let mut by_url = HashMap::with_capacity(rows.len());
                for row in rows {
                    let scraping_date = row.scraping_date.as_deref().and_then(|raw| {
                        let parsed = parse_date(raw);
                        if parsed.is_none() {
                            warn!(source = %self.name, url = %row.url, date = %raw, "unparseable scraping_date");
                        }
                        parsed
                    });
                    let article = RawArticle {
                        url: row.url.clone(),
                        title: row.title,
                        content: row.content,
                        source: row.source.unwrap_or_else(|| self.name.clone()),
                        scraping_date,
                    };
                    if let std::collections::hash_map::Entry::Vacant(slot) = by_url.entry(row.url.clone()) {
                        slot.insert(article);
                        order.push(row.url);
                    }
                }
                Ok::<_, nd_core::Error>((order, by_url))
            })
            .await
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) and bare `YYYY-MM-DD`.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[async_trait]
impl Scraper for FileScraper {
    fn source(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, url: &str) -> bool {
        self.records
            .get()
            .map_or(false, |(_, by_url)| by_url.contains_key(url))
    }

    async fn list_candidate_urls(&self) -> Result<Vec<String>> {
        Ok(self.records().await?.0.clone())
    }

    async fn fetch(&self, url: &str) -> Result<Option<RawArticle>> {
        Ok(self.records().await?.1.get(url).cloned())
    }
}
