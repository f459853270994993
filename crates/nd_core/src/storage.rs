use async_trait::async_trait;

use crate::corpus::Corpus;
use crate::ledger::Ledger;
use crate::types::Article;
use crate::Result;

/// Durable home of the ledger and the corpus.
#[async_trait]
pub trait CurationStore: Send + Sync {
    /// Loads the ledger. A store that was never written yields an empty one.
    async fn load_ledger(&self) -> Result<Ledger>;

    /// Loads the corpus. A store that was never written yields an empty one.
    async fn load_corpus(&self) -> Result<Corpus>;

    /// Persists the outcome of one run: `ledger` and `corpus` are the full
    /// post-merge state and `appended` the rows this run added. Either all of
    /// it becomes visible or none of it does.
    async fn commit(&self, ledger: &Ledger, corpus: &Corpus, appended: &[Article]) -> Result<()>;
}
