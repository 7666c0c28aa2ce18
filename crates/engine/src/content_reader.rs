use poi_pipeline_common::api::fetch::{FetchRequest, FetchResponse};
use poi_pipeline_common::config::FetchSidecarConfig;

/// HTTP client for the Content Reader (C7) — calls the fetch sidecar's
/// `/fetch` endpoint. Failures (network error, non-2xx, timeout) return
/// `None` rather than an error; the caller treats a null read as
/// "reader-failed" and caches an empty extraction for the URL.
pub struct ContentReader {
    http: reqwest::Client,
    base_url: String,
}

impl ContentReader {
    pub fn new(config: &FetchSidecarConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
        }
    }

    pub async fn read(&self, url: &str) -> Option<String> {
        let request = FetchRequest {
            url: url.to_string(),
            options: None,
        };

        let response = match self
            .http
            .post(format!("{}/fetch", self.base_url))
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(url, error = %e, "content reader request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(url, status = %response.status(), "content reader returned non-success");
            return None;
        }

        match response.json::<FetchResponse>().await {
            Ok(body) => Some(body.content),
            Err(e) => {
                tracing::warn!(url, error = %e, "content reader response parse failed");
                None
            }
        }
    }
}
