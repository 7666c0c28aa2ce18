use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use poi_pipeline_common::types::normalize_name;

/// SQLite-backed (name, city) -> place id alias table (C3). Prevents
/// re-resolving the same POI under a different surface name against the
/// Place Resolver on every run.
pub struct AliasCache {
    pool: SqlitePool,
}

#[derive(Debug, thiserror::Error)]
pub enum AliasCacheError {
    #[error("alias cache connection error: {0}")]
    Connection(String),
    #[error("alias cache query error: {0}")]
    Query(String),
}

impl From<AliasCacheError> for poi_pipeline_common::PipelineError {
    fn from(e: AliasCacheError) -> Self {
        poi_pipeline_common::PipelineError::AliasCache(e.to_string())
    }
}

impl AliasCache {
    pub async fn connect(db_path: &str) -> Result<Self, AliasCacheError> {
        let url = if db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            if let Some(parent) = std::path::Path::new(db_path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AliasCacheError::Connection(e.to_string()))?;
            }
            format!("sqlite://{db_path}?mode=rwc")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| AliasCacheError::Connection(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS poi_alias (
                name TEXT NOT NULL,
                city TEXT NOT NULL,
                place_id TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (name, city)
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AliasCacheError::Connection(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_place_id ON poi_alias(place_id)")
            .execute(&pool)
            .await
            .map_err(|e| AliasCacheError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    pub async fn find_by_name(
        &self,
        name: &str,
        city: &str,
    ) -> Result<Option<String>, AliasCacheError> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Ok(None);
        }

        let row: Option<(String,)> =
            sqlx::query_as("SELECT place_id FROM poi_alias WHERE name = ? AND city = ?")
                .bind(&normalized)
                .bind(city)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AliasCacheError::Query(e.to_string()))?;

        Ok(row.map(|(id,)| id))
    }

    pub async fn has_place_id(&self, place_id: &str) -> Result<bool, AliasCacheError> {
        if place_id.is_empty() {
            return Ok(false);
        }

        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM poi_alias WHERE place_id = ? LIMIT 1")
                .bind(place_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AliasCacheError::Query(e.to_string()))?;

        Ok(row.is_some())
    }

    /// Idempotent: first writer wins via `INSERT OR IGNORE`.
    pub async fn add(&self, name: &str, city: &str, place_id: &str) -> Result<(), AliasCacheError> {
        let normalized = normalize_name(name);
        if normalized.is_empty() || place_id.is_empty() {
            return Ok(());
        }

        sqlx::query("INSERT OR IGNORE INTO poi_alias (name, city, place_id) VALUES (?, ?, ?)")
            .bind(&normalized)
            .bind(city)
            .bind(place_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AliasCacheError::Query(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_cache() -> AliasCache {
        AliasCache::connect(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn add_and_find_roundtrip() {
        let cache = test_cache().await;
        cache.add("The Eiffel Tower", "Paris", "place-123").await.unwrap();

        let found = cache.find_by_name("the   eiffel tower", "Paris").await.unwrap();
        assert_eq!(found, Some("place-123".to_string()));
    }

    #[tokio::test]
    async fn add_is_idempotent_first_writer_wins() {
        let cache = test_cache().await;
        cache.add("Louvre", "Paris", "place-1").await.unwrap();
        cache.add("Louvre", "Paris", "place-2").await.unwrap();

        let found = cache.find_by_name("Louvre", "Paris").await.unwrap();
        assert_eq!(found, Some("place-1".to_string()));
    }

    #[tokio::test]
    async fn has_place_id_reflects_registrations() {
        let cache = test_cache().await;
        assert!(!cache.has_place_id("place-9").await.unwrap());
        cache.add("Arc de Triomphe", "Paris", "place-9").await.unwrap();
        assert!(cache.has_place_id("place-9").await.unwrap());
    }
}
