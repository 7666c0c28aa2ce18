mod candidate;
mod poi;
mod state;
mod stats;

pub use candidate::{normalize_title, CandidateSource, SearchCandidate};
pub use poi::{Category, DayHours, OpeningHours, Poi, PoiSource, PriceLevel, TimeSlot};
pub use state::{PipelineState, StateDump, StateDumpMetadata};
pub use stats::{MergeDupPair, PagePoiCounts, RerankerDrop, Stats};

/// Normalizes a POI/alias name for cache keys: trim, collapse internal
/// whitespace to single spaces, lowercase. Unicode characters other than
/// whitespace are left untouched (spec §3 invariant, boundary behavior).
pub fn normalize_name(name: &str) -> String {
    normalize_title(name)
}
