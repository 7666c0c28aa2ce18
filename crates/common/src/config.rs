use serde::{Deserialize, Serialize};

/// Top-level pipeline configuration, deserialized from `pipeline.toml` and
/// validated eagerly at startup (fail loudly — see [`PipelineConfig::validate`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub vector_store: VectorStoreConfig,
    pub place_provider: PlaceProviderConfig,
    pub fetch_sidecar: FetchSidecarConfig,
    pub retry: RetryDefaults,
    pub cache: CacheConfig,
}

/// Knobs enumerated in spec §6.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_keyword_k")]
    pub keyword_k: u32,
    #[serde(default = "default_embedding_k")]
    pub embedding_k: u32,
    #[serde(default = "default_web_search_k")]
    pub web_search_k: u32,
    #[serde(default = "default_final_poi_count")]
    pub final_poi_count: u32,
    #[serde(default = "default_rerank_min_score")]
    pub rerank_min_score: f64,
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,
    #[serde(default = "default_web_weight")]
    pub web_weight: f64,
    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_semaphore_limit")]
    pub semaphore_limit: u32,
}

fn default_keyword_k() -> u32 {
    3
}
fn default_embedding_k() -> u32 {
    5
}
fn default_web_search_k() -> u32 {
    3
}
fn default_final_poi_count() -> u32 {
    20
}
fn default_rerank_min_score() -> f64 {
    0.5
}
fn default_relevance_floor() -> f64 {
    0.3
}
fn default_web_weight() -> f64 {
    0.6
}
fn default_embedding_weight() -> f64 {
    0.4
}
fn default_batch_size() -> u32 {
    10
}
fn default_semaphore_limit() -> u32 {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            keyword_k: default_keyword_k(),
            embedding_k: default_embedding_k(),
            web_search_k: default_web_search_k(),
            final_poi_count: default_final_poi_count(),
            rerank_min_score: default_rerank_min_score(),
            relevance_floor: default_relevance_floor(),
            web_weight: default_web_weight(),
            embedding_weight: default_embedding_weight(),
            batch_size: default_batch_size(),
            semaphore_limit: default_semaphore_limit(),
        }
    }
}

/// Embedding Encoder (C1) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: u32,
    pub batch_size: u32,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,
    /// Task-type -> prefix string prepended to the input (spec §4.1).
    #[serde(default)]
    pub query_prefix: String,
    #[serde(default)]
    pub document_prefix: String,
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// LLM configuration shared by the Summarizer (C9), Query Expander (C10),
/// and Reranker (C12) — all three are single-turn prompt/response calls
/// against the same provider in this deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "anthropic" or "openai" (or an OpenAI-compatible provider).
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Vector Store (C2): Postgres + pgvector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub database_url: String,
    /// Collection/table name — spec §6 requires the literal `poi_embeddings`.
    #[serde(default = "default_collection_name")]
    pub collection: String,
}

fn default_collection_name() -> String {
    "poi_embeddings".to_string()
}

/// Place Resolver (C6) external provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaceProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    /// Location-bias rectangle radius in meters (spec §4.6 step 2, default 50km).
    #[serde(default = "default_location_bias_radius_m")]
    pub location_bias_radius_m: f64,
}

fn default_location_bias_radius_m() -> f64 {
    50_000.0
}

/// Fetch sidecar (Content Reader C7 / Web Search Provider C11).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchSidecarConfig {
    pub base_url: String,
}

/// Default retry parameters, shared by the LLM, Embedding, and Resolver
/// clients (each may override via its own [`RetryConfig`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryDefaults {
    pub llm: RetryConfig,
    pub embedding: RetryConfig,
    pub resolver: RetryConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// File-backed cache locations (C3, C4 are SQLite files; C5 is JSON).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    pub alias_cache_path: String,
    pub url_cache_path: String,
    pub geocode_cache_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads and validates a [`PipelineConfig`] from a TOML file. Fails loudly:
/// any read/parse/validation error aborts startup rather than falling back
/// to defaults for required fields.
pub fn load_config(path: &str) -> Result<PipelineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let config: PipelineConfig = toml::from_str(&raw)?;
    validate(&config)?;
    Ok(config)
}

/// Sanity-checks cross-field invariants that serde's `#[serde(default)]`
/// cannot express on its own.
pub fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    let r = &config.retrieval;
    if r.keyword_k == 0 {
        errors.push("retrieval.keyword_k must be > 0".to_string());
    }
    if !(0.0..=1.0).contains(&r.rerank_min_score) {
        errors.push("retrieval.rerank_min_score must be in [0, 1]".to_string());
    }
    if !(0.0..=1.0).contains(&r.relevance_floor) {
        errors.push("retrieval.relevance_floor must be in [0, 1]".to_string());
    }
    if r.web_weight < 0.0 || r.embedding_weight < 0.0 {
        errors.push("merger weights must be non-negative".to_string());
    }
    if r.semaphore_limit == 0 {
        errors.push("retrieval.semaphore_limit must be > 0".to_string());
    }

    if config.embedding.dimensions == 0 {
        errors.push("embedding.dimensions must be > 0".to_string());
    }

    if config.vector_store.collection != "poi_embeddings" {
        errors.push(
            "vector_store.collection must be \"poi_embeddings\" (spec §6 fixed name)".to_string(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> PipelineConfig {
        PipelineConfig {
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig {
                provider: "openai".into(),
                model: "text-embedding-3-small".into(),
                dimensions: 1536,
                batch_size: 64,
                base_url: default_embedding_base_url(),
                api_key_env: default_embedding_api_key_env(),
                query_prefix: String::new(),
                document_prefix: String::new(),
            },
            llm: LlmConfig {
                provider: "anthropic".into(),
                model: "claude-sonnet".into(),
                max_tokens: 1024,
                temperature: None,
                base_url: None,
                api_key_env: None,
            },
            vector_store: VectorStoreConfig {
                database_url: "postgres://localhost/poi".into(),
                collection: default_collection_name(),
            },
            place_provider: PlaceProviderConfig {
                base_url: "https://places.example.com".into(),
                api_key_env: "PLACES_API_KEY".into(),
                location_bias_radius_m: default_location_bias_radius_m(),
            },
            fetch_sidecar: FetchSidecarConfig {
                base_url: "http://localhost:8081".into(),
            },
            retry: RetryDefaults {
                llm: RetryConfig::default(),
                embedding: RetryConfig::default(),
                resolver: RetryConfig::default(),
            },
            cache: CacheConfig {
                alias_cache_path: "alias_cache.sqlite".into(),
                url_cache_path: "url_cache.sqlite".into(),
                geocode_cache_path: "geocode_cache.json".into(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_collection_name() {
        let mut config = valid_config();
        config.vector_store.collection = "pois".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_scores() {
        let mut config = valid_config();
        config.retrieval.rerank_min_score = 1.5;
        assert!(validate(&config).is_err());
    }
}
