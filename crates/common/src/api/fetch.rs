use serde::{Deserialize, Serialize};

/// POST /fetch request — the Content Reader (C7) contract: URL in, cleaned
/// markdown-ish body out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FetchOptions>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FetchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// POST /fetch response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchResponse {
    pub content: String,
    pub metadata: FetchMetadata,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub url: String,
    /// Whether the response was served from the sidecar's own short-lived
    /// raw-fetch cache (distinct from the Orchestrator's URL Extraction Cache).
    #[serde(default)]
    pub cached: bool,
}

/// POST /search request — the Web Search Provider (C11) contract: keyword
/// in, ranked URL list out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_results: Option<usize>,
}

/// POST /search response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}
