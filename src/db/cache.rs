//! Slot-based read/write of the serialized document.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::Document;

/// A single named cache slot.
#[derive(Clone)]
pub struct LocalCache {
    pool: SqlitePool,
    slot: String,
}

impl LocalCache {
    pub fn new(pool: SqlitePool, slot: impl Into<String>) -> Self {
        Self {
            pool,
            slot: slot.into(),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Read the raw payload stored in the slot, if any.
    pub async fn read(&self) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT payload FROM cache_slots WHERE slot = ?")
            .bind(&self.slot)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("payload")))
    }

    /// Replace the slot with the serialized document.
    pub async fn write(&self, document: &Document) -> Result<(), AppError> {
        let payload = serde_json::to_string(document)?;
        self.write_raw(&payload).await
    }

    pub async fn write_raw(&self, payload: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO cache_slots (slot, payload, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(&self.slot)
        .bind(payload)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// When the slot was last written.
    pub async fn updated_at(&self) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT updated_at FROM cache_slots WHERE slot = ?")
            .bind(&self.slot)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("updated_at")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_slot_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("cache.sqlite"))
            .await
            .unwrap();
        let cache = LocalCache::new(pool, "family");

        assert!(cache.read().await.unwrap().is_none());
        assert!(cache.updated_at().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_overwrites_slot() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("cache.sqlite"))
            .await
            .unwrap();
        let cache = LocalCache::new(pool, "family");

        cache.write(&Document::seed("First")).await.unwrap();
        let second = Document::seed("Second");
        cache.write(&second).await.unwrap();

        let stored: Document = serde_json::from_str(&cache.read().await.unwrap().unwrap()).unwrap();
        assert_eq!(stored, second);
        assert!(cache.updated_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("cache.sqlite"))
            .await
            .unwrap();
        let family = LocalCache::new(pool.clone(), "family");
        let other = LocalCache::new(pool, "other");

        family.write_raw("{}").await.unwrap();

        assert_eq!(family.read().await.unwrap().as_deref(), Some("{}"));
        assert!(other.read().await.unwrap().is_none());
    }
}
