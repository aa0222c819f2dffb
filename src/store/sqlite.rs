use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use super::{DocumentStore, StoreError};

/// sqlite-backed document store: one row per document, JSON body.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create(&self, partition: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO documents (partition_key, id, body) VALUES (?, ?, ?)")
            .bind(partition)
            .bind(id)
            .bind(body.to_string())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, partition: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT body FROM documents WHERE partition_key = ? AND id = ?")
            .bind(partition)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn replace(&self, partition: &str, id: &str, body: Value) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET body = ? WHERE partition_key = ? AND id = ?")
            .bind(body.to_string())
            .bind(partition)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, partition: &str, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE partition_key = ? AND id = ?")
            .bind(partition)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn query_eq(
        &self,
        partition: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query(
            "SELECT body FROM documents WHERE partition_key = ? AND json_extract(body, '$.' || ?) = ?",
        )
        .bind(partition)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                Ok(serde_json::from_str(&body)?)
            })
            .collect()
    }

    async fn list(&self, partition: &str) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query("SELECT body FROM documents WHERE partition_key = ?")
            .bind(partition)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                Ok(serde_json::from_str(&body)?)
            })
            .collect()
    }
}
