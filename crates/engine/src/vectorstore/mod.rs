mod schema;

use std::sync::atomic::{AtomicBool, Ordering};

use pgvector::Vector;
use poi_pipeline_common::config::VectorStoreConfig;
use poi_pipeline_common::types::{Category, Poi, PoiSource, SearchCandidate};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::embeddings::EmbeddingClient;

/// Persistent ANN index over POI embeddings with scalar metadata filtering
/// (C2). Backed by Postgres + pgvector; cosine similarity via `<=>`.
pub struct VectorStore {
    pool: PgPool,
    collection: String,
    /// Sticky degraded flag (spec §4.2): once initialization fails, `search`
    /// returns an empty list rather than erroring on every subsequent call.
    degraded: AtomicBool,
}

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("vector store connection error: {0}")]
    Connection(String),
    #[error("vector store query error: {0}")]
    Query(String),
}

impl From<VectorStoreError> for poi_pipeline_common::PipelineError {
    fn from(e: VectorStoreError) -> Self {
        poi_pipeline_common::PipelineError::VectorStore(e.to_string())
    }
}

impl VectorStore {
    pub async fn connect(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        let store = Self {
            pool,
            collection: config.collection.clone(),
            degraded: AtomicBool::new(false),
        };

        if let Err(e) = schema::initialize(&store.pool, &store.collection).await {
            tracing::warn!(error = %e, "Vector store schema initialization failed, entering degraded mode");
            store.degraded.store(true, Ordering::SeqCst);
        }

        Ok(store)
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Idempotent by `poi_id` — a second call with the same id is a no-op.
    pub async fn add(&self, poi: &Poi, embedding: Vec<f32>) -> Result<(), VectorStoreError> {
        self.add_batch(&[(poi.clone(), embedding)]).await?;
        Ok(())
    }

    /// Deduplicates the input batch by id (first occurrence wins), filters
    /// out ids already present, embeds the remainder, writes atomically.
    /// Returns the count actually written.
    pub async fn add_batch(
        &self,
        items: &[(Poi, Vec<f32>)],
    ) -> Result<usize, VectorStoreError> {
        if items.is_empty() || self.is_degraded() {
            return Ok(0);
        }

        let mut seen = std::collections::HashSet::new();
        let mut deduped = Vec::new();
        for (poi, emb) in items {
            if seen.insert(poi.poi_id.clone()) {
                deduped.push((poi, emb));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        let mut written = 0usize;
        let table = self.collection.clone();
        for (poi, embedding) in deduped {
            let exists: Option<(String,)> =
                sqlx::query_as(&format!("SELECT poi_id FROM {table} WHERE poi_id = $1"))
                    .bind(&poi.poi_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| VectorStoreError::Query(e.to_string()))?;

            if exists.is_some() {
                continue;
            }

            let vector = Vector::from(embedding.clone());
            let types_json = serde_json::to_value(&poi.external_types).unwrap_or_default();
            let hours_json = serde_json::to_value(&poi.opening_hours).unwrap_or_default();

            sqlx::query(&format!(
                "INSERT INTO {table} (
                    poi_id, name, category, description, city, address,
                    latitude, longitude, external_place_id, external_types,
                    primary_type, maps_uri, website_uri, phone,
                    rating, rating_count, price_level, price_range,
                    editorial_summary, generative_summary, review_summary, raw_text,
                    source, source_url, created_at, opening_hours, embedding
                ) VALUES (
                    $1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,
                    $19,$20,$21,$22,$23,$24,$25,$26,$27
                )"
            ))
            .bind(&poi.poi_id)
            .bind(&poi.name)
            .bind(poi.category.as_str())
            .bind(&poi.description)
            .bind(&poi.city)
            .bind(&poi.address)
            .bind(poi.latitude)
            .bind(poi.longitude)
            .bind(&poi.external_place_id)
            .bind(&types_json)
            .bind(&poi.primary_type)
            .bind(&poi.maps_uri)
            .bind(&poi.website_uri)
            .bind(&poi.phone)
            .bind(poi.rating)
            .bind(poi.rating_count.map(|c| c as i32))
            .bind(poi.price_level.map(|p| p.as_str()))
            .bind(&poi.price_range)
            .bind(&poi.editorial_summary)
            .bind(&poi.generative_summary)
            .bind(&poi.review_summary)
            .bind(&poi.raw_text)
            .bind(format!("{:?}", poi.source))
            .bind(&poi.source_url)
            .bind(poi.created_at)
            .bind(&hours_json)
            .bind(vector)
            .execute(&mut *tx)
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;

            written += 1;
        }

        tx.commit()
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        Ok(written)
    }

    /// Up to `k` results ordered by descending cosine similarity
    /// (`score = 1 - distance`), optionally restricted to an exact city.
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        city_filter: Option<&str>,
    ) -> Result<Vec<SearchCandidate>, VectorStoreError> {
        if self.is_degraded() {
            return Ok(Vec::new());
        }

        let rows = self.query_rows(query_vector, k, city_filter).await?;
        Ok(rows
            .into_iter()
            .map(|r| SearchCandidate {
                poi_id: Some(r.get("poi_id")),
                title: r.get("name"),
                snippet: r.try_get("description").unwrap_or_default(),
                url: r.try_get("source_url").ok(),
                source: poi_pipeline_common::types::CandidateSource::EmbeddingStore,
                score: 1.0 - r.get::<f64, _>("distance"),
            })
            .collect())
    }

    pub async fn search_by_text(
        &self,
        query_text: &str,
        k: usize,
        city_filter: Option<&str>,
        embedder: &EmbeddingClient,
    ) -> Result<Vec<SearchCandidate>, VectorStoreError> {
        let vector = embedder
            .embed_documents(std::slice::from_ref(&query_text.to_string()))
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_default();
        self.search(&vector, k, city_filter).await
    }

    /// Same as `search`, but also reconstructs and returns the full POI.
    pub async fn search_with_data(
        &self,
        query_vector: &[f32],
        k: usize,
        city_filter: Option<&str>,
    ) -> Result<Vec<(SearchCandidate, Poi)>, VectorStoreError> {
        if self.is_degraded() {
            return Ok(Vec::new());
        }

        let rows = self.query_rows(query_vector, k, city_filter).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let distance: f64 = row.get("distance");
            let poi = row_to_poi(&row);
            let candidate = SearchCandidate {
                poi_id: Some(poi.poi_id.clone()),
                title: poi.name.clone(),
                snippet: poi.description.clone(),
                url: poi.source_url.clone(),
                source: poi_pipeline_common::types::CandidateSource::EmbeddingStore,
                score: 1.0 - distance,
            };
            out.push((candidate, poi));
        }
        Ok(out)
    }

    pub async fn search_by_text_with_data(
        &self,
        query_text: &str,
        k: usize,
        city_filter: Option<&str>,
        embedder: &EmbeddingClient,
    ) -> Result<Vec<(SearchCandidate, Poi)>, VectorStoreError> {
        let vector = embedder
            .embed_documents(std::slice::from_ref(&query_text.to_string()))
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_default();
        self.search_with_data(&vector, k, city_filter).await
    }

    pub async fn find_by_name(
        &self,
        name: &str,
        city_filter: Option<&str>,
    ) -> Result<Option<Poi>, VectorStoreError> {
        if self.is_degraded() {
            return Ok(None);
        }
        let table = self.collection.clone();
        let row = if let Some(city) = city_filter {
            sqlx::query(&format!("SELECT * FROM {table} WHERE name = $1 AND city = $2 LIMIT 1"))
                .bind(name)
                .bind(city)
                .fetch_optional(&self.pool)
                .await
        } else {
            sqlx::query(&format!("SELECT * FROM {table} WHERE name = $1 LIMIT 1"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await
        }
        .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        Ok(row.map(|r| row_to_poi(&r)))
    }

    pub async fn find_by_place_id(
        &self,
        place_id: &str,
        city_filter: Option<&str>,
    ) -> Result<Option<Poi>, VectorStoreError> {
        if self.is_degraded() {
            return Ok(None);
        }
        let table = self.collection.clone();
        let row = if let Some(city) = city_filter {
            sqlx::query(&format!(
                "SELECT * FROM {table} WHERE external_place_id = $1 AND city = $2 LIMIT 1"
            ))
            .bind(place_id)
            .bind(city)
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query(&format!(
                "SELECT * FROM {table} WHERE external_place_id = $1 LIMIT 1"
            ))
            .bind(place_id)
            .fetch_optional(&self.pool)
            .await
        }
        .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        Ok(row.map(|r| row_to_poi(&r)))
    }

    async fn query_rows(
        &self,
        query_vector: &[f32],
        k: usize,
        city_filter: Option<&str>,
    ) -> Result<Vec<sqlx::postgres::PgRow>, VectorStoreError> {
        let table = self.collection.clone();
        let vector = Vector::from(query_vector.to_vec());

        let rows = if let Some(city) = city_filter {
            sqlx::query(&format!(
                "SELECT *, embedding <=> $1 AS distance FROM {table}
                 WHERE city = $2
                 ORDER BY embedding <=> $1
                 LIMIT $3"
            ))
            .bind(vector)
            .bind(city)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(&format!(
                "SELECT *, embedding <=> $1 AS distance FROM {table}
                 ORDER BY embedding <=> $1
                 LIMIT $2"
            ))
            .bind(vector)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        Ok(rows)
    }
}

fn row_to_poi(row: &sqlx::postgres::PgRow) -> Poi {
    let external_types: serde_json::Value = row.try_get("external_types").unwrap_or_default();
    let opening_hours: serde_json::Value = row.try_get("opening_hours").unwrap_or_default();
    let category_str: String = row.try_get("category").unwrap_or_default();
    let source_str: String = row.try_get("source").unwrap_or_default();

    Poi {
        poi_id: row.try_get("poi_id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        category: category_str.parse::<Category>().unwrap_or(Category::Other),
        description: row.try_get("description").unwrap_or_default(),
        city: row.try_get("city").unwrap_or_default(),
        address: row.try_get("address").unwrap_or_default(),
        latitude: row.try_get("latitude").ok(),
        longitude: row.try_get("longitude").ok(),
        external_place_id: row.try_get("external_place_id").ok(),
        external_types: serde_json::from_value(external_types).unwrap_or_default(),
        primary_type: row.try_get("primary_type").ok(),
        maps_uri: row.try_get("maps_uri").ok(),
        website_uri: row.try_get("website_uri").ok(),
        phone: row.try_get("phone").ok(),
        rating: row.try_get("rating").ok(),
        rating_count: row
            .try_get::<Option<i32>, _>("rating_count")
            .ok()
            .flatten()
            .map(|c| c as u32),
        price_level: row
            .try_get::<Option<String>, _>("price_level")
            .ok()
            .flatten()
            .and_then(|s| match s.as_str() {
                "FREE" => Some(poi_pipeline_common::types::PriceLevel::Free),
                "INEXPENSIVE" => Some(poi_pipeline_common::types::PriceLevel::Inexpensive),
                "MODERATE" => Some(poi_pipeline_common::types::PriceLevel::Moderate),
                "EXPENSIVE" => Some(poi_pipeline_common::types::PriceLevel::Expensive),
                "VERY_EXPENSIVE" => Some(poi_pipeline_common::types::PriceLevel::VeryExpensive),
                _ => None,
            }),
        price_range: row.try_get("price_range").ok(),
        editorial_summary: row.try_get("editorial_summary").unwrap_or_default(),
        generative_summary: row.try_get("generative_summary").unwrap_or_default(),
        review_summary: row.try_get("review_summary").unwrap_or_default(),
        raw_text: row.try_get("raw_text").unwrap_or_default(),
        source: match source_str.as_str() {
            "EmbeddingStore" => PoiSource::EmbeddingStore,
            "UserFeedback" => PoiSource::UserFeedback,
            _ => PoiSource::WebSearch,
        },
        source_url: row.try_get("source_url").ok(),
        created_at: row
            .try_get("created_at")
            .unwrap_or_else(|_| chrono::Utc::now()),
        opening_hours: serde_json::from_value(opening_hours).unwrap_or(None),
    }
}
