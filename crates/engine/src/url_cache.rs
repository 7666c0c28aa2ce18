use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use poi_pipeline_common::types::SearchCandidate;

/// SQLite-backed cache of per-URL extraction results (C4), keyed by
/// `(url, destination)`. Avoids re-running the Content Reader + Extractor
/// chain against the same page on every run. An empty list is cached too
/// ("negative caching") — a page that yielded nothing is not retried.
pub struct UrlCache {
    pool: SqlitePool,
}

#[derive(Debug, thiserror::Error)]
pub enum UrlCacheError {
    #[error("url cache connection error: {0}")]
    Connection(String),
    #[error("url cache query error: {0}")]
    Query(String),
    #[error("url cache serialization error: {0}")]
    Serialization(String),
}

impl From<UrlCacheError> for poi_pipeline_common::PipelineError {
    fn from(e: UrlCacheError) -> Self {
        poi_pipeline_common::PipelineError::UrlCache(e.to_string())
    }
}

impl UrlCache {
    pub async fn connect(db_path: &str) -> Result<Self, UrlCacheError> {
        let url = if db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            if let Some(parent) = std::path::Path::new(db_path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| UrlCacheError::Connection(e.to_string()))?;
            }
            format!("sqlite://{db_path}?mode=rwc")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| UrlCacheError::Connection(e.to_string()))?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(|e| UrlCacheError::Connection(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS url_cache (
                url TEXT NOT NULL,
                destination TEXT NOT NULL DEFAULT '',
                results_json TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (url, destination)
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| UrlCacheError::Connection(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_url_cache_destination ON url_cache(destination)")
            .execute(&pool)
            .await
            .map_err(|e| UrlCacheError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    pub async fn get(
        &self,
        url: &str,
        destination: &str,
    ) -> Result<Option<Vec<SearchCandidate>>, UrlCacheError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT results_json FROM url_cache WHERE url = ? AND destination = ?")
                .bind(url)
                .bind(destination)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| UrlCacheError::Query(e.to_string()))?;

        match row {
            None => Ok(None),
            Some((json,)) => {
                let results: Vec<SearchCandidate> = serde_json::from_str(&json)
                    .map_err(|e| UrlCacheError::Serialization(e.to_string()))?;
                Ok(Some(results))
            }
        }
    }

    pub async fn put(
        &self,
        url: &str,
        destination: &str,
        results: &[SearchCandidate],
    ) -> Result<(), UrlCacheError> {
        let json =
            serde_json::to_string(results).map_err(|e| UrlCacheError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO url_cache (url, destination, results_json) VALUES (?, ?, ?)",
        )
        .bind(url)
        .bind(destination)
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(|e| UrlCacheError::Query(e.to_string()))?;

        Ok(())
    }

    pub async fn has(&self, url: &str, destination: &str) -> Result<bool, UrlCacheError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM url_cache WHERE url = ? AND destination = ?")
                .bind(url)
                .bind(destination)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| UrlCacheError::Query(e.to_string()))?;

        Ok(row.is_some())
    }

    pub async fn get_by_destination(
        &self,
        destination: &str,
    ) -> Result<Vec<(String, Vec<SearchCandidate>)>, UrlCacheError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT url, results_json FROM url_cache WHERE destination = ?")
                .bind(destination)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| UrlCacheError::Query(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for (url, json) in rows {
            if let Ok(results) = serde_json::from_str::<Vec<SearchCandidate>>(&json) {
                out.push((url, results));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_pipeline_common::types::CandidateSource;

    fn sample_candidate() -> SearchCandidate {
        SearchCandidate {
            poi_id: None,
            title: "Some Cafe".into(),
            snippet: "A cafe".into(),
            url: Some("https://example.com/cafe".into()),
            source: CandidateSource::WebSearch,
            score: 0.5,
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let cache = UrlCache::connect(":memory:").await.unwrap();
        let results = vec![sample_candidate()];
        cache.put("https://example.com/page", "Paris", &results).await.unwrap();

        let fetched = cache.get("https://example.com/page", "Paris").await.unwrap();
        assert_eq!(fetched.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn negative_caching_stores_empty_result() {
        let cache = UrlCache::connect(":memory:").await.unwrap();
        cache.put("https://example.com/empty", "Paris", &[]).await.unwrap();

        let fetched = cache.get("https://example.com/empty", "Paris").await.unwrap();
        assert_eq!(fetched, Some(Vec::new()));
        assert!(cache.has("https://example.com/empty", "Paris").await.unwrap());
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = UrlCache::connect(":memory:").await.unwrap();
        assert!(cache.get("https://example.com/missing", "Paris").await.unwrap().is_none());
    }
}
