use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Poi, SearchCandidate, Stats};

/// The mutable record threaded through the Orchestrator's state-machine
/// stages (spec §3/§4.14). Exists for exactly one run and is discarded at
/// completion — except when `save_path` is supplied, in which case it is
/// serialized to disk alongside a small metadata block (§6).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub persona_summary: String,
    pub travel_destination: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    pub target: usize,

    pub keywords: Vec<String>,
    pub reranked_embedding: Vec<SearchCandidate>,
    pub reranked_web: Vec<SearchCandidate>,

    /// POIs keyed by `poi_id`, populated by the embedding-branch
    /// reconstruction and by the Place Resolver's admissions. The Merger's
    /// output candidates are resolved back to full POIs through this map.
    pub poi_data_map: HashMap<String, Poi>,

    pub final_pois: Vec<Poi>,
    pub stats: Stats,
}

/// The debug dump format written when `run(..., save_path)` is supplied:
/// a small metadata block plus the full state, matching the original
/// system's `save_state_to_json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateDump {
    pub metadata: StateDumpMetadata,
    pub state: PipelineState,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateDumpMetadata {
    pub generated_at: chrono::DateTime<chrono::Utc>,
}
