use poi_pipeline_common::api::fetch::{SearchRequest, SearchResponse};
use poi_pipeline_common::config::FetchSidecarConfig;
use poi_pipeline_common::types::{normalize_name, SearchCandidate};

use crate::content_reader::ContentReader;
use crate::extractor::Extractor;
use crate::llm::LlmClient;
use crate::url_cache::UrlCache;

/// Per-URL outcome of a single keyword's search, carrying enough detail for
/// the Orchestrator to populate `Stats.per_page`/`total_pages`/`cache_hit_pages`
/// (spec §4.15) without recomputing anything the provider already knows.
pub struct PageOutcome {
    pub url: String,
    pub candidates: Vec<SearchCandidate>,
    pub cached: bool,
    pub raw_count: usize,
    pub title_dup: usize,
}

/// Adapter over the fetch sidecar's `/search` endpoint (C11). `search`
/// returns the flattened union of per-URL extractions, piping each result
/// URL through the cache/reader/extractor chain (spec §4.14's caching
/// discipline: cache hit skips the reader+extractor call entirely).
pub struct WebSearchProvider<'a> {
    http: reqwest::Client,
    base_url: String,
    url_cache: &'a UrlCache,
    content_reader: &'a ContentReader,
    llm: &'a LlmClient,
}

impl<'a> WebSearchProvider<'a> {
    pub fn new(
        config: &FetchSidecarConfig,
        url_cache: &'a UrlCache,
        content_reader: &'a ContentReader,
        llm: &'a LlmClient,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            url_cache,
            content_reader,
            llm,
        }
    }

    pub async fn search(
        &self,
        keyword: &str,
        n: usize,
        destination: &str,
    ) -> Vec<PageOutcome> {
        let urls = match self.search_urls(keyword, n).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(keyword, error = %e, "web search provider request failed");
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(urls.len());
        for url in urls {
            outcomes.push(self.process_url(&url, destination).await);
        }
        outcomes
    }

    async fn search_urls(&self, keyword: &str, n: usize) -> Result<Vec<String>, String> {
        let request = SearchRequest {
            query: keyword.to_string(),
            num_results: Some(n),
        };

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }

        let body: SearchResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.results.into_iter().map(|r| r.url).collect())
    }

    /// Cache-hit path skips the reader+extractor. On miss: read, extract,
    /// dedup by title within this URL, cache (including empty results).
    async fn process_url(&self, url: &str, destination: &str) -> PageOutcome {
        if let Ok(Some(cached)) = self.url_cache.get(url, destination).await {
            let raw_count = cached.len();
            return PageOutcome {
                url: url.to_string(),
                candidates: cached,
                cached: true,
                raw_count,
                title_dup: 0,
            };
        }

        let markdown = self.content_reader.read(url).await;
        let extracted = match markdown {
            Some(text) => {
                let extractor = Extractor::new(self.llm);
                extractor.extract(&text, Some(url)).await.unwrap_or_default()
            }
            None => Vec::new(),
        };

        let raw_count = extracted.len();
        let deduped = dedup_by_title(extracted);
        let title_dup = raw_count - deduped.len();

        if let Err(e) = self.url_cache.put(url, destination, &deduped).await {
            tracing::warn!(url, error = %e, "failed to write url cache entry");
        }

        PageOutcome {
            url: url.to_string(),
            candidates: deduped,
            cached: false,
            raw_count,
            title_dup,
        }
    }
}

fn dedup_by_title(candidates: Vec<SearchCandidate>) -> Vec<SearchCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(normalize_name(&c.title)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_pipeline_common::types::CandidateSource;

    fn candidate(title: &str) -> SearchCandidate {
        SearchCandidate {
            poi_id: None,
            title: title.into(),
            snippet: String::new(),
            url: None,
            source: CandidateSource::WebSearch,
            score: 0.5,
        }
    }

    #[test]
    fn dedup_by_title_is_case_and_whitespace_insensitive() {
        let input = vec![candidate("Blue Bottle"), candidate("blue   bottle")];
        let deduped = dedup_by_title(input);
        assert_eq!(deduped.len(), 1);
    }
}
