pub mod logging;
pub mod manager;
pub mod normalization;
pub mod scrapers;

pub use manager::{Candidate, Collection, FetchOutcome, ScraperManager};
pub use normalization::{Normalizer, StopwordNormalizer};
pub use scrapers::{FileScraper, HtmlScraper, Scraper};

pub mod prelude {
    pub use super::scrapers::Scraper;
    pub use nd_core::{Error, RawArticle, Result};
}
