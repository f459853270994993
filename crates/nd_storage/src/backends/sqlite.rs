use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nd_core::{Article, Corpus, CurationStore, Error, Ledger, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

pub const DB_FILE: &str = "curation.db";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ledger (
        url TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        source TEXT NOT NULL,
        scraping_date TEXT,
        language TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        is_valid INTEGER NOT NULL,
        embedding TEXT NOT NULL,
        cluster INTEGER NOT NULL,
        similarity_to_centroid REAL NOT NULL,
        source_score REAL NOT NULL,
        novelty_score REAL NOT NULL,
        recency_score REAL NOT NULL,
        final_score REAL NOT NULL
    )
    "#,
];

fn db_error(context: &str, e: sqlx::Error) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

/// Ledger and corpus as two tables of one SQLite database. A commit is one
/// transaction; existing rows are never updated.
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteStore {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| db_error("invalid database path", e))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| db_error("failed to open database", e))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| db_error(&format!("migration {} failed", i), e))?;
        }

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let get_err = |e: sqlx::Error| db_error("malformed article row", e);

    let scraping_date = row
        .try_get::<Option<String>, _>("scraping_date")
        .map_err(get_err)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| Error::Storage(format!("bad scraping_date {:?}: {}", s, e)))
        })
        .transpose()?;
    let embedding: Vec<f32> =
        serde_json::from_str(&row.try_get::<String, _>("embedding").map_err(get_err)?)?;

    Ok(Article {
        url: row.try_get("url").map_err(get_err)?,
        title: row.try_get("title").map_err(get_err)?,
        content: row.try_get("content").map_err(get_err)?,
        source: row.try_get("source").map_err(get_err)?,
        scraping_date,
        language: row.try_get("language").map_err(get_err)?,
        word_count: row.try_get::<i64, _>("word_count").map_err(get_err)? as usize,
        is_valid: row.try_get("is_valid").map_err(get_err)?,
        embedding,
        cluster: row.try_get::<i64, _>("cluster").map_err(get_err)? as usize,
        similarity_to_centroid: row.try_get("similarity_to_centroid").map_err(get_err)?,
        source_score: row.try_get("source_score").map_err(get_err)?,
        novelty_score: row.try_get("novelty_score").map_err(get_err)?,
        recency_score: row.try_get("recency_score").map_err(get_err)?,
        final_score: row.try_get("final_score").map_err(get_err)?,
    })
}

#[async_trait]
impl CurationStore for SqliteStore {
    async fn load_ledger(&self) -> Result<Ledger> {
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM ledger")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("failed to load ledger", e))?;
        Ok(urls.into_iter().collect())
    }

    async fn load_corpus(&self) -> Result<Corpus> {
        let rows = sqlx::query("SELECT * FROM articles ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("failed to load corpus", e))?;
        let articles = rows.iter().map(article_from_row).collect::<Result<Vec<_>>>()?;
        Corpus::from_articles(articles)
    }

    async fn commit(&self, ledger: &Ledger, corpus: &Corpus, appended: &[Article]) -> Result<()> {
        corpus.check_consistent(ledger)?;

        // dropping the transaction without commit rolls it back
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("failed to begin transaction", e))?;

        for article in appended {
            let embedding = serde_json::to_string(&article.embedding)?;
            sqlx::query(
                r#"
                INSERT INTO articles
                (url, title, content, source, scraping_date, language, word_count, is_valid,
                 embedding, cluster, similarity_to_centroid, source_score, novelty_score,
                 recency_score, final_score)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&article.url)
            .bind(&article.title)
            .bind(&article.content)
            .bind(&article.source)
            .bind(article.scraping_date.map(|d| d.to_rfc3339()))
            .bind(&article.language)
            .bind(article.word_count as i64)
            .bind(article.is_valid)
            .bind(embedding)
            .bind(article.cluster as i64)
            .bind(article.similarity_to_centroid)
            .bind(article.source_score)
            .bind(article.novelty_score)
            .bind(article.recency_score)
            .bind(article.final_score)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::DuplicateUrl {
                    url: article.url.clone(),
                },
                e => db_error("failed to insert article", e),
            })?;
        }

        for url in ledger.iter() {
            sqlx::query("INSERT OR IGNORE INTO ledger (url) VALUES (?)")
                .bind(url)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("failed to record url", e))?;
        }

        let (ledger_rows, article_rows): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM ledger), (SELECT COUNT(*) FROM articles)",
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("failed to count rows", e))?;
        if ledger_rows as usize != ledger.len() || article_rows as usize != corpus.len() {
            return Err(Error::Desync(format!(
                "database would hold {} ledger urls and {} articles, expected {} and {}",
                ledger_rows,
                article_rows,
                ledger.len(),
                corpus.len()
            )));
        }

        tx.commit()
            .await
            .map_err(|e| db_error("failed to commit transaction", e))?;
        debug!(db = %self.db_path.display(), appended = appended.len(), "commit complete");
        Ok(())
    }
}
