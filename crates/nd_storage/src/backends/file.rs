//! JSON-on-disk store: `ledger.json` and `corpus.json` under one directory.
//!
//! A commit stages both files as fsynced temp files first, then renames the
//! corpus and the ledger into place. A failure while staging touches neither
//! file. A failed ledger rename puts the previous corpus back, so a commit
//! that returns an error leaves the store as it was. Only a crash between the
//! two renames can leave a corpus holding rows the ledger does not list yet;
//! that state is rolled forward on load, anything else is a desync.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nd_core::{Article, Corpus, CurationStore, Error, Ledger, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

pub const LEDGER_FILE: &str = "ledger.json";
pub const CORPUS_FILE: &str = "corpus.json";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    fn corpus_path(&self) -> PathBuf {
        self.dir.join(CORPUS_FILE)
    }

    /// Loads both files and reconciles them.
    async fn load_state(&self) -> Result<(Ledger, Corpus)> {
        let ledger: Ledger = read_json(&self.ledger_path()).await?.unwrap_or_default();
        let corpus: Corpus = read_json(&self.corpus_path()).await?.unwrap_or_default();

        if corpus.check_consistent(&ledger).is_ok() {
            return Ok((ledger, corpus));
        }

        let corpus_urls = corpus.url_ledger();
        if ledger.is_subset(&corpus_urls) {
            warn!(
                dir = %self.dir.display(),
                ledger = ledger.len(),
                corpus = corpus.len(),
                "ledger behind corpus after interrupted commit, rolling forward"
            );
            return Ok((corpus_urls, corpus));
        }

        Err(Error::Desync(format!(
            "{} lists urls missing from {} in {}",
            LEDGER_FILE,
            CORPUS_FILE,
            self.dir.display()
        )))
    }
}

async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let Some(bytes) = read_bytes(path).await? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Storage(format!("cannot parse {}: {}", path.display(), e)))?;
    Ok(Some(value))
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Writes `bytes` next to `path` and fsyncs it. Returns the temp path.
async fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let temp_path = temp_path(path);
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(bytes).await.map_err(|e| {
        warn!(path = %temp_path.display(), error = %e, "write failed");
        e
    })?;
    file.sync_all().await?;
    Ok(temp_path)
}

async fn promote(temp_path: &Path, path: &Path) -> Result<()> {
    fs::rename(temp_path, path).await.map_err(|e| {
        warn!(from = %temp_path.display(), to = %path.display(), error = %e, "rename failed");
        e
    })?;
    debug!(path = %path.display(), "wrote");
    Ok(())
}

async fn discard(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path).await {
        debug!(path = %temp_path.display(), error = %e, "temp file not removed");
    }
}

async fn stage_json<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    stage(path, &serde_json::to_vec_pretty(value)?).await
}

#[cfg(test)]
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let temp_path = stage_json(path, value).await?;
    promote(&temp_path, path).await
}

impl FileStore {
    /// Puts `previous` back as the corpus file, or removes the file if there
    /// was none.
    async fn restore_corpus(&self, previous: Option<Vec<u8>>) {
        let path = self.corpus_path();
        let restored = match previous {
            Some(bytes) => match stage(&path, &bytes).await {
                Ok(temp_path) => promote(&temp_path, &path).await,
                Err(e) => Err(e),
            },
            None => fs::remove_file(&path).await.map_err(Error::from),
        };
        match restored {
            Ok(()) => warn!(path = %path.display(), "commit failed, previous corpus restored"),
            Err(e) => error!(path = %path.display(), error = %e, "commit failed and previous corpus could not be restored"),
        }
    }
}

#[async_trait]
impl CurationStore for FileStore {
    async fn load_ledger(&self) -> Result<Ledger> {
        Ok(self.load_state().await?.0)
    }

    async fn load_corpus(&self) -> Result<Corpus> {
        Ok(self.load_state().await?.1)
    }

    async fn commit(&self, ledger: &Ledger, corpus: &Corpus, appended: &[Article]) -> Result<()> {
        corpus.check_consistent(ledger)?;
        fs::create_dir_all(&self.dir).await?;

        let corpus_path = self.corpus_path();
        let ledger_path = self.ledger_path();
        let previous = read_bytes(&corpus_path).await?;

        let corpus_temp = stage_json(&corpus_path, corpus).await?;
        let ledger_temp = match stage_json(&ledger_path, ledger).await {
            Ok(temp_path) => temp_path,
            Err(e) => {
                discard(&corpus_temp).await;
                return Err(e);
            }
        };

        if let Err(e) = promote(&corpus_temp, &corpus_path).await {
            discard(&corpus_temp).await;
            discard(&ledger_temp).await;
            return Err(e);
        }
        if let Err(e) = promote(&ledger_temp, &ledger_path).await {
            discard(&ledger_temp).await;
            self.restore_corpus(previous).await;
            return Err(e);
        }

        debug!(
            dir = %self.dir.display(),
            appended = appended.len(),
            total = corpus.len(),
            "commit complete"
        );
        Ok(())
    }
}
