mod web_path;

use std::collections::HashMap;
use std::sync::Arc;

use poi_pipeline_common::config::PipelineConfig;
use poi_pipeline_common::types::{CandidateSource, PipelineState, Poi, SearchCandidate, StateDump, StateDumpMetadata};
use poi_pipeline_common::{PipelineError, Result};

use crate::alias_cache::AliasCache;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::content_reader::ContentReader;
use crate::embeddings::EmbeddingClient;
use crate::geocode_cache::GeocodeCache;
use crate::llm::LlmClient;
use crate::query_expander::QueryExpander;
use crate::reranker::Reranker;
use crate::resolver::PlaceResolver;
use crate::url_cache::UrlCache;
use crate::vectorstore::VectorStore;

/// Drives a single retrieval run through the state machine described in
/// spec §4.14: extract_keywords -> vector_db_first_search -> rerank_embedding
/// -> (conditional) -> [web_search -> process_and_rerank_web] -> merge_results.
pub struct Orchestrator {
    vector_store: Arc<VectorStore>,
    alias_cache: Arc<AliasCache>,
    url_cache: Arc<UrlCache>,
    geocode_cache: Arc<GeocodeCache>,
    resolver: Option<Arc<PlaceResolver>>,
    llm: Option<Arc<LlmClient>>,
    embedding: Option<Arc<EmbeddingClient>>,
    content_reader: Arc<ContentReader>,
    config: Arc<PipelineConfig>,
    circuit_breakers: Arc<CircuitBreakerRegistry>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vector_store: Arc<VectorStore>,
        alias_cache: Arc<AliasCache>,
        url_cache: Arc<UrlCache>,
        geocode_cache: Arc<GeocodeCache>,
        resolver: Option<Arc<PlaceResolver>>,
        llm: Option<Arc<LlmClient>>,
        embedding: Option<Arc<EmbeddingClient>>,
        content_reader: Arc<ContentReader>,
        config: Arc<PipelineConfig>,
        circuit_breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            vector_store,
            alias_cache,
            url_cache,
            geocode_cache,
            resolver,
            llm,
            embedding,
            content_reader,
            config,
            circuit_breakers,
        }
    }

    pub(crate) fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn resolver(&self) -> Option<Arc<PlaceResolver>> {
        self.resolver.clone()
    }

    pub(crate) fn llm(&self) -> Option<Arc<LlmClient>> {
        self.llm.clone()
    }

    pub(crate) fn embedding(&self) -> Option<Arc<EmbeddingClient>> {
        self.embedding.clone()
    }

    pub(crate) fn alias_cache(&self) -> Arc<AliasCache> {
        Arc::clone(&self.alias_cache)
    }

    pub(crate) fn vector_store(&self) -> Arc<VectorStore> {
        Arc::clone(&self.vector_store)
    }

    pub(crate) fn geocode_cache(&self) -> Arc<GeocodeCache> {
        Arc::clone(&self.geocode_cache)
    }

    /// External entry point (spec §6). Returns the final, score-ordered POI
    /// list plus the full run state. Only surfaces an error when the
    /// orchestrator itself cannot progress — a missing embedding client or
    /// empty persona text; everything else is recovered locally and counted.
    pub async fn run(
        &self,
        persona_summary: String,
        travel_destination: String,
        start_date: String,
        end_date: String,
        save_path: Option<String>,
    ) -> Result<(Vec<Poi>, PipelineState)> {
        if persona_summary.trim().is_empty() {
            return Err(PipelineError::Validation("persona_summary is empty".into()));
        }

        if self.embedding.is_none() {
            return Err(PipelineError::Embedding("embedding client unavailable".into()));
        }

        if let Some(circuit) = self.circuit_breakers.any_hard_open() {
            return Err(PipelineError::CircuitOpen(circuit.to_string()));
        }

        let span = tracing::info_span!(
            "poi_run",
            destination = %travel_destination,
            start_date = %start_date,
            end_date = %end_date
        );
        let _enter = span.enter();

        let target = compute_target(&start_date, &end_date, self.config.retrieval.final_poi_count);
        tracing::info!(target, "Computed target POI count");

        let mut state = PipelineState {
            persona_summary: persona_summary.clone(),
            travel_destination: travel_destination.clone(),
            start_date,
            end_date,
            target,
            ..Default::default()
        };

        state.keywords = self.extract_keywords(&state).await;
        state.stats.keywords = state.keywords.clone();
        tracing::info!(count = state.keywords.len(), "Expanded search keywords");

        let embedding_candidates = self.vector_db_first_search(&mut state).await;
        tracing::info!(count = embedding_candidates.len(), "Vector store candidates");

        state.reranked_embedding = self.rerank_embedding(embedding_candidates, &mut state).await;
        tracing::info!(count = state.reranked_embedding.len(), "Reranked embedding-branch candidates");

        if state.reranked_embedding.len() < state.target {
            tracing::info!("Embedding branch below target, entering web search branch");
            let web_candidates = self.web_search(&mut state).await;
            state.reranked_web = web_path::process_and_rerank_web(self, &mut state, web_candidates).await;
        } else {
            tracing::info!(
                count = state.reranked_embedding.len(),
                target = state.target,
                "Embedding branch satisfied target, skipping web search"
            );
        }

        self.merge_results(&mut state).await;

        if let Some(path) = save_path {
            self.save_debug_dump(&state, &path);
        }

        tracing::info!(report = %state.stats.format_report(), "Run complete");
        metrics::gauge!("poi_pipeline.final_poi_count").set(state.final_pois.len() as f64);

        Ok((state.final_pois.clone(), state))
    }

    async fn extract_keywords(&self, state: &PipelineState) -> Vec<String> {
        let Some(llm) = &self.llm else {
            tracing::warn!("LLM client unavailable, skipping keyword expansion");
            return Vec::new();
        };

        let expander = QueryExpander::new(llm);
        match expander
            .expand(
                &state.persona_summary,
                &state.travel_destination,
                &state.start_date,
                &state.end_date,
            )
            .await
        {
            Ok(keywords) => keywords,
            Err(e) => {
                tracing::warn!(error = %e, "query expansion failed");
                Vec::new()
            }
        }
    }

    /// One vector-store query over the full persona summary plus keywords,
    /// filtered by the configured relevance floor. Populates `poi_data_map`
    /// from the reconstructed POI half of each hit (spec §4.3).
    async fn vector_db_first_search(&self, state: &mut PipelineState) -> Vec<SearchCandidate> {
        let embedding = self.embedding.as_ref().expect("checked in run()");

        let query_text = if state.keywords.is_empty() {
            state.persona_summary.clone()
        } else {
            format!("{} {}", state.persona_summary, state.keywords.join(" "))
        };

        let results = match self
            .vector_store
            .search_by_text_with_data(
                &query_text,
                self.config.retrieval.embedding_k as usize,
                Some(&state.travel_destination),
                embedding,
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "vector store first-pass search failed");
                return Vec::new();
            }
        };

        let floor = self.config.retrieval.relevance_floor;
        let mut candidates = Vec::new();
        for (candidate, poi) in results {
            if candidate.score < floor {
                continue;
            }
            state.poi_data_map.insert(poi.poi_id.clone(), poi);
            candidates.push(candidate);
        }
        candidates
    }

    async fn rerank_embedding(&self, candidates: Vec<SearchCandidate>, state: &mut PipelineState) -> Vec<SearchCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let Some(llm) = &self.llm else {
            tracing::warn!("LLM client unavailable, passing embedding candidates through unranked");
            return candidates;
        };

        let reranker = Reranker::new(llm);
        state.stats.reranker_pre_count += candidates.len();
        match reranker
            .rerank(
                candidates,
                &state.persona_summary,
                5, // embedding-path batch size (spec §4.12)
                self.config.retrieval.rerank_min_score,
            )
            .await
        {
            Ok((survivors, drops)) => {
                state.stats.reranker_post_count += survivors.len();
                for drop in drops {
                    state.stats.reranker_dropped.push(poi_pipeline_common::types::RerankerDrop {
                        title: drop.title,
                        score: drop.score,
                    });
                }
                survivors
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding-branch reranking failed");
                Vec::new()
            }
        }
    }

    /// Fans out over the top `keyword_k` keywords concurrently, flattens the
    /// per-keyword results, and applies a second, cross-keyword title-level
    /// dedup pass over the whole set.
    async fn web_search(&self, state: &mut PipelineState) -> Vec<SearchCandidate> {
        let Some(llm) = self.llm.clone() else {
            tracing::warn!("LLM client unavailable, skipping web search branch");
            return Vec::new();
        };

        let keyword_k = self.config.retrieval.keyword_k as usize;
        let keywords: Vec<String> = state.keywords.iter().take(keyword_k).cloned().collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let web_search_k = self.config.retrieval.web_search_k as usize;
        let destination = state.travel_destination.clone();

        let mut join_set = tokio::task::JoinSet::new();
        for keyword in keywords {
            let url_cache = Arc::clone(&self.url_cache);
            let content_reader = Arc::clone(&self.content_reader);
            let llm = Arc::clone(&llm);
            let fetch_config = self.config.fetch_sidecar.clone();
            let destination = destination.clone();

            join_set.spawn(async move {
                let provider = crate::web_search::WebSearchProvider::new(
                    &fetch_config,
                    &url_cache,
                    &content_reader,
                    &llm,
                );
                let outcomes = provider.search(&keyword, web_search_k, &destination).await;
                (keyword, outcomes)
            });
        }

        let mut raw = Vec::new();
        let mut pages_per_keyword = HashMap::new();
        let mut per_page = Vec::new();
        let mut total_pages = 0usize;
        let mut cache_hit_pages = 0usize;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((keyword, outcomes)) => {
                    let keyword_count: usize = outcomes.iter().map(|o| o.candidates.len()).sum();
                    pages_per_keyword.insert(keyword, keyword_count);
                    for outcome in outcomes {
                        total_pages += 1;
                        if outcome.cached {
                            cache_hit_pages += 1;
                        }
                        per_page.push(poi_pipeline_common::types::PagePoiCounts {
                            url: outcome.url,
                            raw: outcome.raw_count,
                            title_dup: outcome.title_dup,
                            final_count: outcome.candidates.len(),
                        });
                        raw.extend(outcome.candidates);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "web search task panicked"),
            }
        }

        state.stats.pages_per_keyword = pages_per_keyword;
        state.stats.total_pages = total_pages;
        state.stats.cache_hit_pages = cache_hit_pages;
        state.stats.per_page = per_page;
        state.stats.web_raw_count = raw.len();

        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<SearchCandidate> = raw
            .into_iter()
            .filter(|c| seen.insert(c.normalized_title()))
            .collect();

        state.stats.web_dedup_count = deduped.len();
        deduped
    }

    /// Folds web and embedding branch candidates (spec §4.13), registers
    /// newly confirmed aliases for web-to-embedding duplicates, then
    /// resolves every surviving candidate back to a full POI via
    /// `poi_data_map`. Candidates with no map entry are dropped and logged.
    async fn merge_results(&self, state: &mut PipelineState) {
        let outcome = crate::merger::merge(
            state.reranked_web.clone(),
            state.reranked_embedding.clone(),
            self.config.retrieval.web_weight,
            self.config.retrieval.embedding_weight,
        );

        state.stats.merge_web_dup_count = outcome.web_internal_dup_count;
        state.stats.merge_emb_dup_count = outcome.web_to_embedding_dup_count;
        state.stats.merge_dup_pairs = outcome.dup_pairs.clone();

        for pair in &outcome.dup_pairs {
            if let Some(poi) = state.poi_data_map.get(&pair.poi_id) {
                let place_id = poi.external_place_id.clone().unwrap_or_else(|| poi.poi_id.clone());
                if let Err(e) = self.alias_cache.add(&pair.title, &state.travel_destination, &place_id).await {
                    tracing::warn!(error = %e, "alias registration failed during merge");
                }
            }
        }

        let mut final_pois = Vec::with_capacity(outcome.merged.len());
        for candidate in &outcome.merged {
            match candidate.poi_id.as_ref().and_then(|id| state.poi_data_map.get(id)) {
                Some(poi) => final_pois.push(poi.clone()),
                None => {
                    tracing::warn!(
                        poi_id = ?candidate.poi_id,
                        title = %candidate.title,
                        "merged candidate has no poi_data_map entry, dropping"
                    );
                }
            }
        }

        state.final_pois = final_pois;
    }

    fn save_debug_dump(&self, state: &PipelineState, path: &str) {
        let dump = StateDump {
            metadata: StateDumpMetadata {
                generated_at: chrono::Utc::now(),
            },
            state: state.clone(),
        };

        match serde_json::to_string_pretty(&dump) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(path, error = %e, "failed to write debug state dump");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize debug state dump"),
        }
    }
}

/// `target = travel_days * 5`, `travel_days = (end - start) + 1`. Falls back
/// to `default_target` when dates are missing or unparsable (spec §4.14).
fn compute_target(start_date: &str, end_date: &str, default_target: u32) -> usize {
    let parse = |s: &str| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();

    match (parse(start_date), parse(end_date)) {
        (Some(start), Some(end)) if end >= start => {
            let travel_days = (end - start).num_days() + 1;
            (travel_days as usize) * 5
        }
        _ => default_target as usize,
    }
}

/// A web-path candidate that resolved to an already-known place (alias hit
/// or freshly discovered alias): wraps the existing POI under the current
/// web title/snippet/url so the merger and stats treat it uniformly.
pub(crate) fn candidate_for_existing_poi(poi: &Poi, title: &str, snippet: &str, url: Option<&str>) -> SearchCandidate {
    SearchCandidate {
        poi_id: Some(poi.poi_id.clone()),
        title: title.to_string(),
        snippet: snippet.to_string(),
        url: url.map(String::from),
        source: CandidateSource::WebSearch,
        score: 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_target_uses_travel_days_times_five() {
        assert_eq!(compute_target("2026-03-01", "2026-03-05", 20), 25);
    }

    #[test]
    fn compute_target_falls_back_on_missing_dates() {
        assert_eq!(compute_target("", "", 20), 20);
    }

    #[test]
    fn compute_target_falls_back_on_inverted_dates() {
        assert_eq!(compute_target("2026-03-05", "2026-03-01", 15), 15);
    }
}
