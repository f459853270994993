use async_trait::async_trait;
use nd_core::{Article, Corpus, CurationStore, Ledger, Result};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    ledger: Ledger,
    corpus: Corpus,
    commits: usize,
}

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store, checking the ledger/corpus invariant.
    pub fn with_state(ledger: Ledger, corpus: Corpus) -> Result<Self> {
        corpus.check_consistent(&ledger)?;
        Ok(Self {
            state: RwLock::new(MemoryState {
                ledger,
                corpus,
                commits: 0,
            }),
        })
    }

    /// How many commits have landed, for tests that assert on persistence.
    pub async fn commits(&self) -> usize {
        self.state.read().await.commits
    }
}

#[async_trait]
impl CurationStore for MemoryStore {
    async fn load_ledger(&self) -> Result<Ledger> {
        Ok(self.state.read().await.ledger.clone())
    }

    async fn load_corpus(&self) -> Result<Corpus> {
        Ok(self.state.read().await.corpus.clone())
    }

    async fn commit(&self, ledger: &Ledger, corpus: &Corpus, _appended: &[Article]) -> Result<()> {
        corpus.check_consistent(ledger)?;
        let mut state = self.state.write().await;
        state.ledger = ledger.clone();
        state.corpus = corpus.clone();
        state.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::tests::article;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load_ledger().await.unwrap().is_empty());
        assert!(store.load_corpus().await.unwrap().is_empty());

        let row = article("https://a.com/1");
        let corpus = Corpus::from_articles(vec![row.clone()]).unwrap();
        let ledger: Ledger = ["https://a.com/1"].into_iter().collect();
        store.commit(&ledger, &corpus, &[row]).await.unwrap();

        assert_eq!(store.load_ledger().await.unwrap(), ledger);
        assert_eq!(store.load_corpus().await.unwrap(), corpus);
        assert_eq!(store.commits().await, 1);
    }

    #[tokio::test]
    async fn test_commit_rejects_desync() {
        let store = MemoryStore::new();
        let row = article("https://a.com/1");
        let corpus = Corpus::from_articles(vec![row.clone()]).unwrap();
        let err = store.commit(&Ledger::new(), &corpus, &[row]).await.unwrap_err();
        assert!(matches!(err, nd_core::Error::Desync(_)));
        assert_eq!(store.commits().await, 0);
    }
}
