use thiserror::Error;

/// Top-level error type for pipeline operations. Per-module error enums
/// (`EmbeddingError`, `VectorStoreError`, `ResolverError`, `LlmError`, ...)
/// convert into this via `From` at the point where the Orchestrator needs a
/// single type to log or propagate.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The embedding encoder is unavailable — a hard dependency; per spec
    /// §7 the run cannot progress without it.
    #[error("embedding encoder error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("alias cache error: {0}")]
    AliasCache(String),

    #[error("url extraction cache error: {0}")]
    UrlCache(String),

    #[error("geocoding error: {0}")]
    Geocode(String),

    #[error("place resolver error: {0}")]
    Resolver(String),

    #[error("LLM API error: {0}")]
    Llm(String),

    #[error("fetch sidecar error: {0}")]
    Fetch(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    /// Hard dependency: the orchestrator cannot progress and the run must
    /// surface an error to the caller (spec §7 "Recovery").
    pub fn is_hard_dependency(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_) | Self::Config(_) | Self::Validation(_)
        )
    }

    /// Soft dependency: recovered locally at the component boundary — the
    /// candidate or batch is dropped, counted, and the run continues.
    pub fn is_soft_dependency(&self) -> bool {
        matches!(
            self,
            Self::VectorStore(_)
                | Self::AliasCache(_)
                | Self::UrlCache(_)
                | Self::Geocode(_)
                | Self::Resolver(_)
                | Self::Llm(_)
                | Self::Fetch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
