use sqlx::PgPool;

use super::VectorStoreError;

/// Run the vector store's migrations and verify the configured collection
/// name matches the table the migrations created. `collection` is always
/// `poi_embeddings` (enforced by `PipelineConfig::validate`), but this stays
/// a parameter so a future collection rename only touches the migration.
pub async fn initialize(pool: &PgPool, collection: &str) -> Result<(), VectorStoreError> {
    sqlx::migrate!("src/vectorstore/migrations")
        .run(pool)
        .await
        .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
    )
    .bind(collection)
    .fetch_one(pool)
    .await
    .map_err(|e| VectorStoreError::Query(e.to_string()))?;

    if !exists.0 {
        return Err(VectorStoreError::Query(format!(
            "collection table '{collection}' not found after migration"
        )));
    }

    Ok(())
}
