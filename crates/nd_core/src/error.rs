use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Article {url} has no embedding")]
    MissingEmbedding { url: String },

    #[error("Duplicate URL in corpus merge: {url}")]
    DuplicateUrl { url: String },

    #[error("Ledger and corpus out of sync: {0}")]
    Desync(String),

    #[error("Run lock already held at {path} ({holder})")]
    Locked { path: String, holder: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error must abort a curation run.
    ///
    /// Source failures and per-article gaps are recovered inside their stage;
    /// everything touching models, configuration, persistence or the
    /// ledger/corpus invariant propagates.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Scraping(_) | Error::Http(_) | Error::MissingEmbedding { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::Scraping("timeout".into()).is_fatal());
        assert!(!Error::MissingEmbedding { url: "https://a".into() }.is_fatal());
        assert!(Error::DuplicateUrl { url: "https://a".into() }.is_fatal());
        assert!(Error::Config("no clusters".into()).is_fatal());
        assert!(Error::Inference("model down".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = Error::DuplicateUrl { url: "https://a".into() };
        assert_eq!(err.to_string(), "Duplicate URL in corpus merge: https://a");
    }
}
