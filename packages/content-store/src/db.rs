// SQLite record database for the CLI
//
// A record is a named entity carrying content metadata; the bytes themselves
// live in the content store.
use crate::entity::ContentFields;
use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// A named entity with associated content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    pub name: String,
    pub content_id: Option<String>,
    pub content_length: u64,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl ContentFields for Record {
    fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    fn set_content_id(&mut self, id: Option<String>) {
        self.content_id = id;
    }

    fn content_length(&self) -> u64 {
        self.content_length
    }

    fn set_content_length(&mut self, length: u64) {
        self.content_length = length;
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    name: String,
    content_id: Option<String>,
    content_length: i64,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Self {
            name: row.name,
            content_id: row.content_id,
            content_length: row.content_length.max(0) as u64,
        }
    }
}

/// Record database wrapper
pub struct RecordDb {
    pool: SqlitePool,
}

impl RecordDb {
    /// Create or open the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self> {
        // Each connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                name TEXT PRIMARY KEY NOT NULL,
                content_id TEXT,
                content_length INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .context("Failed to create records table")?;

        Ok(Self { pool })
    }

    pub async fn find(&self, name: &str) -> Result<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT name, content_id, content_length FROM records WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up record: {}", name))?;

        Ok(row.map(Record::from))
    }

    /// The stored record, or a fresh one without content
    pub async fn find_or_new(&self, name: &str) -> Result<Record> {
        Ok(self.find(name).await?.unwrap_or_else(|| Record::new(name)))
    }

    /// Insert or update a record
    pub async fn save(&self, record: &Record) -> Result<()> {
        let length = i64::try_from(record.content_length)
            .with_context(|| format!("Content length out of range: {}", record.content_length))?;

        sqlx::query(
            "INSERT INTO records (name, content_id, content_length) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                content_id = excluded.content_id,
                content_length = excluded.content_length",
        )
        .bind(&record.name)
        .bind(&record.content_id)
        .bind(length)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save record: {}", record.name))?;

        Ok(())
    }

    /// All records, ordered by name
    pub async fn list(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT name, content_id, content_length FROM records ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list records")?;

        Ok(rows.into_iter().map(Record::from).collect())
    }
}
