use std::sync::Arc;

use poi_pipeline_common::types::{normalize_name, PipelineState, Poi, SearchCandidate};

use crate::reranker::Reranker;
use crate::summarizer::Summarizer;

use super::{candidate_for_existing_poi, Orchestrator};

/// What a single web candidate turned into after summarize -> alias-lookup
/// -> resolve (spec §4.14 "process_and_rerank_web").
enum Outcome {
    /// Resolved to an already-known place — no store write needed, but the
    /// POI still needs a `poi_data_map` entry for this run.
    ExistingPoi(Poi, SearchCandidate),
    /// A genuinely new place, pending embedding and admission to the store.
    NewPoi(Poi, SearchCandidate),
    Dropped(&'static str),
}

/// Processes deduped web candidates in fixed-size batches, bounding
/// per-candidate resolver/summarizer concurrency with a semaphore. Each
/// batch's survivors are reranked in a single LLM call; early termination
/// triggers once enough high-confidence results have accumulated.
pub(super) async fn process_and_rerank_web(
    orchestrator: &Orchestrator,
    state: &mut PipelineState,
    candidates: Vec<SearchCandidate>,
) -> Vec<SearchCandidate> {
    let batch_size = (orchestrator.config().retrieval.batch_size as usize).max(1);
    let semaphore_limit = (orchestrator.config().retrieval.semaphore_limit as usize).max(1);
    let min_score = orchestrator.config().retrieval.rerank_min_score;
    let target = state.target;

    let Some(llm) = orchestrator.llm() else {
        tracing::warn!("LLM client unavailable, skipping web candidate processing");
        return Vec::new();
    };

    let mut reranked_web = Vec::new();

    for batch in candidates.chunks(batch_size) {
        let outcomes = process_batch(orchestrator, state, batch, semaphore_limit).await;

        let mut new_pois = Vec::new();
        let mut batch_candidates = Vec::new();

        for outcome in outcomes {
            match outcome {
                Outcome::ExistingPoi(poi, candidate) => {
                    state.stats.alias_hits += 1;
                    state.poi_data_map.insert(poi.poi_id.clone(), poi);
                    batch_candidates.push(candidate);
                }
                Outcome::NewPoi(poi, candidate) => {
                    new_pois.push(poi);
                    batch_candidates.push(candidate);
                }
                Outcome::Dropped(reason) => state.stats.record_drop(reason),
            }
        }

        admit_new_pois(orchestrator, state, new_pois).await;

        if batch_candidates.is_empty() {
            continue;
        }

        let reranker = Reranker::new(&llm);
        state.stats.reranker_pre_count += batch_candidates.len();
        let batch_len = batch_candidates.len();
        match reranker
            .rerank(batch_candidates, &state.persona_summary, batch_len, min_score)
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
                reranked_web.extend(survivors);
            }
            Err(e) => tracing::warn!(error = %e, "web-branch batch reranking failed"),
        }

        state.stats.early_termination_checked += 1;
        let good_count = reranked_web.iter().filter(|c| c.score >= 0.5).count();
        if good_count >= target {
            state.stats.early_termination_skipped += 1;
            tracing::info!(good_count, target, "Early termination of web batch loop");
            break;
        }
    }

    // spec §4.12/§8 P7: the aggregated list must be globally sorted, not just
    // sorted within each batch's reranker call.
    reranked_web.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    state.stats.web_final_count = reranked_web.len();
    reranked_web
}

async fn process_batch(
    orchestrator: &Orchestrator,
    state: &PipelineState,
    batch: &[SearchCandidate],
    semaphore_limit: usize,
) -> Vec<Outcome> {
    let Some(llm) = orchestrator.llm() else {
        return batch.iter().map(|_| Outcome::Dropped("summarize_failed")).collect();
    };

    let alias_cache = orchestrator.alias_cache();
    let vector_store = orchestrator.vector_store();
    let resolver = orchestrator.resolver();
    let geocode_cache = orchestrator.geocode_cache();
    let destination = state.travel_destination.clone();
    let persona = state.persona_summary.clone();
    let semaphore = Arc::new(tokio::sync::Semaphore::new(semaphore_limit));

    let mut join_set = tokio::task::JoinSet::new();
    for (index, candidate) in batch.iter().cloned().enumerate() {
        let llm = Arc::clone(&llm);
        let alias_cache = Arc::clone(&alias_cache);
        let vector_store = Arc::clone(&vector_store);
        let resolver = resolver.clone();
        let geocode_cache = Arc::clone(&geocode_cache);
        let destination = destination.clone();
        let persona = persona.clone();
        let semaphore = Arc::clone(&semaphore);

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = process_one(
                &llm,
                &alias_cache,
                &vector_store,
                resolver.as_deref(),
                &geocode_cache,
                &destination,
                &persona,
                &candidate,
            )
            .await;
            (index, outcome)
        });
    }

    let mut results: Vec<Option<Outcome>> = (0..batch.len()).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, outcome)) => results[index] = Some(outcome),
            Err(e) => tracing::warn!(error = %e, "web candidate processing task panicked"),
        }
    }

    results
        .into_iter()
        .map(|o| o.unwrap_or(Outcome::Dropped("cancelled")))
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn process_one(
    llm: &crate::llm::LlmClient,
    alias_cache: &crate::alias_cache::AliasCache,
    vector_store: &crate::vectorstore::VectorStore,
    resolver: Option<&crate::resolver::PlaceResolver>,
    geocode_cache: &crate::geocode_cache::GeocodeCache,
    destination: &str,
    persona: &str,
    candidate: &SearchCandidate,
) -> Outcome {
    let summarizer = Summarizer::new(llm);
    let summary = match summarizer.summarize(candidate, persona).await {
        Ok(Some(summary)) => summary,
        Ok(None) => return Outcome::Dropped("summarize_failed"),
        Err(e) => {
            tracing::warn!(error = %e, title = %candidate.title, "summarizer call failed");
            return Outcome::Dropped("summarize_failed");
        }
    };

    let normalized = normalize_name(&summary.name);

    match alias_cache.find_by_name(&normalized, destination).await {
        Ok(Some(place_id)) => {
            return match vector_store.find_by_place_id(&place_id, Some(destination)).await {
                Ok(Some(poi)) => {
                    let new_candidate = candidate_for_existing_poi(
                        &poi,
                        &candidate.title,
                        &candidate.snippet,
                        candidate.url.as_deref(),
                    );
                    Outcome::ExistingPoi(poi, new_candidate)
                }
                Ok(None) => Outcome::Dropped("store_write_failed"),
                Err(e) => {
                    tracing::warn!(error = %e, "vector store lookup by place id failed");
                    Outcome::Dropped("store_write_failed")
                }
            };
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "alias cache lookup failed"),
    }

    let Some(resolver) = resolver else {
        return Outcome::Dropped("mapper_failed");
    };

    let poi = match resolver
        .resolve(&summary, destination, candidate.url.as_deref(), geocode_cache)
        .await
    {
        Ok(poi) => poi,
        Err(e) => {
            tracing::warn!(error = %e, title = %summary.name, "place resolver failed");
            return Outcome::Dropped("mapper_failed");
        }
    };

    let Some(place_id) = poi.external_place_id.clone() else {
        return Outcome::Dropped("mapper_failed");
    };

    match alias_cache.has_place_id(&place_id).await {
        Ok(true) => {
            if let Err(e) = alias_cache.add(&normalized, destination, &place_id).await {
                tracing::warn!(error = %e, "alias registration failed");
            }
            match vector_store.find_by_place_id(&place_id, Some(destination)).await {
                Ok(Some(existing)) => {
                    let new_candidate = candidate_for_existing_poi(
                        &existing,
                        &candidate.title,
                        &candidate.snippet,
                        candidate.url.as_deref(),
                    );
                    Outcome::ExistingPoi(existing, new_candidate)
                }
                Ok(None) => Outcome::Dropped("store_write_failed"),
                Err(e) => {
                    tracing::warn!(error = %e, "vector store lookup by place id failed");
                    Outcome::Dropped("store_write_failed")
                }
            }
        }
        Ok(false) => {
            if let Err(e) = alias_cache.add(&normalized, destination, &place_id).await {
                tracing::warn!(error = %e, "alias registration failed");
            }
            let new_candidate = candidate_for_existing_poi(
                &poi,
                &candidate.title,
                &candidate.snippet,
                candidate.url.as_deref(),
            );
            Outcome::NewPoi(poi, new_candidate)
        }
        Err(e) => {
            tracing::warn!(error = %e, "alias cache has_place_id check failed");
            Outcome::Dropped("cache_write_failed")
        }
    }
}

/// Embeds each newly admitted POI's `raw_text` and writes the batch to the
/// vector store atomically, then registers the POIs in `poi_data_map` so the
/// merge stage can resolve their candidates back to full records.
async fn admit_new_pois(orchestrator: &Orchestrator, state: &mut PipelineState, new_pois: Vec<Poi>) {
    if new_pois.is_empty() {
        return;
    }

    let Some(embedding) = orchestrator.embedding() else {
        tracing::warn!(count = new_pois.len(), "embedding client unavailable, dropping new POIs");
        for _ in &new_pois {
            state.stats.record_drop("store_write_failed");
        }
        return;
    };

    let texts: Vec<String> = new_pois.iter().map(|p| p.raw_text.clone()).collect();
    let vectors = match embedding.embed_documents(&texts).await {
        Ok(vectors) => vectors,
        Err(e) => {
            tracing::warn!(error = %e, "failed to embed new POIs, dropping batch");
            for _ in &new_pois {
                state.stats.record_drop("store_write_failed");
            }
            return;
        }
    };

    let items: Vec<(Poi, Vec<f32>)> = new_pois.into_iter().zip(vectors).collect();
    let vector_store = orchestrator.vector_store();
    match vector_store.add_batch(&items).await {
        Ok(written) => {
            tracing::info!(written, "Admitted new POIs to vector store");
            state.stats.resolver_processed += written;
        }
        Err(e) => {
            tracing::warn!(error = %e, "vector store batch write failed");
            state.stats.record_drop("store_write_failed");
        }
    }

    for (poi, _) in &items {
        state.poi_data_map.insert(poi.poi_id.clone(), poi.clone());
    }
}
