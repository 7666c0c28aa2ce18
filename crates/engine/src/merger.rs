use poi_pipeline_common::types::{MergeDupPair, SearchCandidate};

/// Result of [`merge`]: the merged, score-sorted candidate list plus the
/// duplicate-title pairs observed while folding embedding candidates into
/// web candidates (fed to the Orchestrator's Alias Cache registration step).
pub struct MergeOutcome {
    pub merged: Vec<SearchCandidate>,
    pub web_internal_dup_count: usize,
    pub web_to_embedding_dup_count: usize,
    pub dup_pairs: Vec<MergeDupPair>,
}

struct Entry {
    candidate: SearchCandidate,
    score: f64,
}

/// Pure merge algorithm (spec §4.13). Keys by `poi_id` > `url` > `title`;
/// web-internal duplicates accumulate score, web-to-embedding duplicates
/// accumulate score AND backfill `poi_id` from the embedding-store side.
pub fn merge(
    web_reranked: Vec<SearchCandidate>,
    embedding_reranked: Vec<SearchCandidate>,
    web_weight: f64,
    embedding_weight: f64,
) -> MergeOutcome {
    let mut entries: std::collections::HashMap<String, Entry> = std::collections::HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut web_internal_dup_count = 0;
    let mut web_to_embedding_dup_count = 0;
    let mut dup_pairs = Vec::new();

    for candidate in web_reranked {
        let key = candidate.merge_key();
        let weighted = candidate.score * web_weight;

        match entries.get_mut(&key) {
            Some(entry) => {
                entry.score += weighted;
                web_internal_dup_count += 1;
            }
            None => {
                order.push(key.clone());
                let mut scored = candidate;
                scored.score = weighted;
                entries.insert(key, Entry { score: weighted, candidate: scored });
            }
        }
    }

    for candidate in embedding_reranked {
        let key = candidate.merge_key();
        let weighted = candidate.score * embedding_weight;

        match entries.get_mut(&key) {
            Some(entry) => {
                entry.score += weighted;
                web_to_embedding_dup_count += 1;
                dup_pairs.push(MergeDupPair {
                    title: entry.candidate.title.clone(),
                    poi_id: candidate.poi_id.clone().unwrap_or_default(),
                });
                if let Some(poi_id) = &candidate.poi_id {
                    entry.candidate.poi_id = Some(poi_id.clone());
                }
            }
            None => {
                order.push(key.clone());
                let mut scored = candidate;
                scored.score = weighted;
                entries.insert(key, Entry { score: weighted, candidate: scored });
            }
        }
    }

    let mut merged: Vec<SearchCandidate> = order
        .into_iter()
        .filter_map(|key| entries.remove(&key))
        .map(|entry| {
            let mut candidate = entry.candidate;
            candidate.score = entry.score;
            candidate
        })
        .collect();

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    MergeOutcome {
        merged,
        web_internal_dup_count,
        web_to_embedding_dup_count,
        dup_pairs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_pipeline_common::types::CandidateSource;

    fn web(title: &str, poi_id: Option<&str>, score: f64) -> SearchCandidate {
        SearchCandidate {
            poi_id: poi_id.map(String::from),
            title: title.into(),
            snippet: String::new(),
            url: Some(format!("https://example.com/{title}")),
            source: CandidateSource::WebSearch,
            score,
        }
    }

    fn embedding(title: &str, poi_id: Option<&str>, score: f64) -> SearchCandidate {
        SearchCandidate {
            poi_id: poi_id.map(String::from),
            title: title.into(),
            snippet: String::new(),
            url: None,
            source: CandidateSource::EmbeddingStore,
            score,
        }
    }

    #[test]
    fn merges_non_overlapping_candidates_and_sorts_by_score() {
        let web_list = vec![web("Cafe A", None, 0.8)];
        let emb_list = vec![embedding("Museum B", Some("p1"), 0.9)];

        let outcome = merge(web_list, emb_list, 0.6, 0.4);
        assert_eq!(outcome.merged.len(), 2);
        assert_eq!(outcome.merged[0].title, "Museum B");
        assert!((outcome.merged[0].score - 0.36).abs() < 1e-9);
        assert!((outcome.merged[1].score - 0.48).abs() < 1e-9);
    }

    #[test]
    fn web_internal_duplicate_keys_accumulate_score() {
        let web_list = vec![
            web("Cafe A", Some("p1"), 0.5),
            web("Cafe A", Some("p1"), 0.5),
        ];
        let outcome = merge(web_list, Vec::new(), 1.0, 1.0);
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.web_internal_dup_count, 1);
        assert!((outcome.merged[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn web_to_embedding_duplicate_backfills_poi_id_and_records_pair() {
        let web_list = vec![web("Cafe A", None, 0.5)];
        let emb_list = vec![embedding("Cafe A", Some("place-42"), 0.5)];

        // Same URL-less title key requires identical merge_key: since web
        // candidate has a url, force a title-only match by clearing it.
        let mut web_list = web_list;
        web_list[0].url = None;

        let outcome = merge(web_list, emb_list, 0.6, 0.4);
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.web_to_embedding_dup_count, 1);
        assert_eq!(outcome.merged[0].poi_id, Some("place-42".to_string()));
        assert_eq!(outcome.dup_pairs.len(), 1);
    }
}
