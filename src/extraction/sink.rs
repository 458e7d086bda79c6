use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use thiserror::Error;

use super::article::DownstreamRecord;

#[derive(Debug, Error)]
pub enum TableSinkError {
    #[error("table sink database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable fallback for downstream records the publisher couldn't accept.
/// Appends one row per record to a local SQLite table; nothing ever reads
/// this table back in-process, it exists purely so a failed publish isn't
/// silently lost.
pub struct TableSink {
    pool: Pool<Sqlite>,
}

impl TableSink {
    pub async fn connect(path: &str) -> Result<Self, TableSinkError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS extracted_articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                publication_date TEXT NOT NULL,
                source TEXT NOT NULL,
                url TEXT NOT NULL,
                summary TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL,
                categories TEXT NOT NULL,
                images TEXT NOT NULL,
                inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn append(&self, record: &DownstreamRecord) -> Result<(), TableSinkError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO extracted_articles
                (id, title, author, publication_date, source, url, summary, content, tags, categories, images)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.publication_date)
        .bind(&record.source)
        .bind(&record.url)
        .bind(&record.summary)
        .bind(&record.content)
        .bind(&record.tags)
        .bind(&record.categories)
        .bind(&record.images)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, TableSinkError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM extracted_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record() -> DownstreamRecord {
        DownstreamRecord {
            id: Uuid::new_v4().to_string(),
            title: "Title".to_string(),
            author: "NULL".to_string(),
            publication_date: "NULL".to_string(),
            source: "Example".to_string(),
            url: "https://example.com/a".to_string(),
            summary: "NULL".to_string(),
            content: "NULL".to_string(),
            tags: "NULL".to_string(),
            categories: "NULL".to_string(),
            images: "NULL".to_string(),
        }
    }

    #[tokio::test]
    async fn appends_and_counts_rows() {
        let sink = TableSink::connect(":memory:").await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 0);
        sink.append(&record()).await.unwrap();
        sink.append(&record()).await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn append_with_publication_date_null_sentinel_round_trips() {
        let sink = TableSink::connect(":memory:").await.unwrap();
        let r = record();
        sink.append(&r).await.unwrap();
        let row: (String,) = sqlx::query_as("SELECT publication_date FROM extracted_articles WHERE id = ?")
            .bind(&r.id)
            .fetch_one(&sink.pool)
            .await
            .unwrap();
        assert_eq!(row.0, "NULL");
    }
}
