mod anthropic;
mod openai;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use poi_pipeline_common::config::{LlmConfig, RetryConfig};

pub use types::TokenUsage;

/// LLM API client used by the Summarizer (C9), Query Expander (C10), and
/// Reranker (C12). All three are single-turn prompt/response calls, so the
/// client exposes a single `complete(system, user) -> text` operation rather
/// than a full multi-turn/tool-use conversation API.
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
    retry_config: RetryConfig,
    api_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM HTTP error: {0}")]
    Http(String),

    #[error("LLM auth error: {0}")]
    Auth(String),

    #[error("LLM rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("LLM context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM response parse error: {0}")]
    Parse(String),
}

impl LlmError {
    fn is_non_retryable(&self) -> bool {
        matches!(self, LlmError::Auth(_) | LlmError::ContextWindowExceeded(_))
    }
}

impl From<LlmError> for poi_pipeline_common::PipelineError {
    fn from(e: LlmError) -> Self {
        poi_pipeline_common::PipelineError::Llm(e.to_string())
    }
}

impl LlmClient {
    /// Reads the API key from the env var named by `config.api_key_env`,
    /// falling back to the provider's standard var. Returns `None` if unset
    /// — callers treat a missing LLM client as a hard dependency failure
    /// (spec §7: "the embedding encoder is unavailable" analog for LLM-backed
    /// stages means those stages simply cannot run).
    pub fn new(config: LlmConfig, retry_config: RetryConfig) -> Option<Self> {
        let env_var = config.api_key_env.clone().unwrap_or_else(|| {
            match config.provider.as_str() {
                "anthropic" => "ANTHROPIC_API_KEY",
                _ => "OPENAI_API_KEY",
            }
            .to_string()
        });

        let api_key = match std::env::var(&env_var) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!(env_var = %env_var, provider = %config.provider, "LLM API key not set");
                return None;
            }
        };

        Some(Self {
            http: reqwest::Client::new(),
            config,
            retry_config,
            api_key,
        })
    }

    /// Send a single-turn completion request with retry/backoff/jitter.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        let mut backoff_ms = self.retry_config.initial_backoff_ms;

        loop {
            attempt += 1;
            let result = self.send_once(system, user).await;

            match result {
                Ok(text) => return Ok(text),
                Err(ref e) if e.is_non_retryable() => {
                    metrics::counter!("llm.api.errors", "provider" => self.config.provider.clone())
                        .increment(1);
                    return result;
                }
                Err(LlmError::RateLimited { retry_after }) => {
                    if attempt >= self.retry_config.max_attempts {
                        metrics::counter!("llm.api.errors", "provider" => self.config.provider.clone())
                            .increment(1);
                        return Err(LlmError::RateLimited { retry_after });
                    }
                    let wait = retry_after.map(|s| s * 1000).unwrap_or(backoff_ms);
                    tracing::warn!(attempt, wait_ms = wait, "LLM rate limited, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                }
                Err(e) => {
                    if attempt >= self.retry_config.max_attempts {
                        metrics::counter!("llm.api.errors", "provider" => self.config.provider.clone())
                            .increment(1);
                        return Err(e);
                    }
                    let jitter = if self.retry_config.jitter {
                        compute_jitter(attempt, backoff_ms)
                    } else {
                        0
                    };
                    let wait = backoff_ms + jitter;
                    tracing::warn!(attempt, wait_ms = wait, error = %e, "LLM API error, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
                    backoff_ms = (backoff_ms as f64 * self.retry_config.backoff_multiplier) as u64;
                    backoff_ms = backoff_ms.min(self.retry_config.max_backoff_ms);
                }
            }
        }
    }

    async fn send_once(&self, system: &str, user: &str) -> Result<String, LlmError> {
        match self.config.provider.as_str() {
            "anthropic" => {
                anthropic::send_message(
                    &self.http,
                    &self.api_key,
                    &self.config.model,
                    self.config.max_tokens,
                    self.config.temperature,
                    system,
                    user,
                )
                .await
            }
            "openai" => {
                openai::send_chat_completion(
                    &self.http,
                    &self.api_key,
                    &self.config.model,
                    self.config.max_tokens,
                    self.config.temperature,
                    system,
                    user,
                )
                .await
            }
            other => Err(LlmError::Api(format!("Unknown provider: {}", other))),
        }
    }
}

fn compute_jitter(attempt: u32, backoff_ms: u64) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    attempt.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    hasher.finish() % (backoff_ms / 2 + 1)
}

/// Object-safe trait so C9/C10/C12 can be tested against a mock without a
/// live LLM client.
pub trait LlmCaller: Send + Sync {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}

impl LlmCaller for LlmClient {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(system, user))
    }
}
