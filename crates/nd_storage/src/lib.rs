use std::sync::Arc;

use nd_core::config::{StorageBackendKind, StorageConfig};
use nd_core::{CurationStore, Result};
use tracing::info;

pub mod backends;
pub mod lock;

pub use backends::*;
pub use lock::RunLock;

/// Opens the configured backend rooted at `config.data_dir`.
pub async fn create_store(config: &StorageConfig) -> Result<Arc<dyn CurationStore>> {
    let store: Arc<dyn CurationStore> = match config.backend {
        StorageBackendKind::Memory => Arc::new(MemoryStore::new()),
        StorageBackendKind::File => Arc::new(FileStore::new(&config.data_dir)),
        #[cfg(feature = "sqlite")]
        StorageBackendKind::Sqlite => {
            let path = config.data_dir.join(backends::sqlite::DB_FILE);
            Arc::new(SqliteStore::new_with_path(&path).await?)
        }
        #[cfg(not(feature = "sqlite"))]
        StorageBackendKind::Sqlite => {
            return Err(nd_core::Error::Config(
                "sqlite backend requested but nd_storage was built without the `sqlite` feature"
                    .into(),
            ))
        }
    };
    info!(backend = ?config.backend, data_dir = %config.data_dir.display(), "store opened");
    Ok(store)
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_store, RunLock};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackendKind::File,
            data_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let store = create_store(&config).await.unwrap();
        assert!(store.load_ledger().await.unwrap().is_empty());
    }

    #[cfg(not(feature = "sqlite"))]
    #[tokio::test]
    async fn test_sqlite_requires_feature() {
        let config = StorageConfig {
            backend: StorageBackendKind::Sqlite,
            ..StorageConfig::default()
        };
        assert!(create_store(&config).await.is_err());
    }
}
