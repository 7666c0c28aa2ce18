use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-run counters and drop-reason traces (spec §4.15 / §3 "Stats").
/// Accumulated by the Orchestrator as it runs, then emitted as a formatted
/// text report at run end.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Stats {
    pub keywords: Vec<String>,
    pub pages_per_keyword: HashMap<String, usize>,
    pub total_pages: usize,
    pub cache_hit_pages: usize,

    pub per_page: Vec<PagePoiCounts>,
    pub web_raw_count: usize,
    pub web_dedup_count: usize,
    pub web_final_count: usize,

    pub alias_hits: usize,
    pub resolver_processed: usize,

    /// Counts keyed by the error-taxonomy kind (spec §7): `summarize_failed`,
    /// `mapper_failed`, `reader_failed`, `store_write_failed`,
    /// `cache_write_failed`, `geocode_unresolvable`, etc.
    pub drop_reasons: HashMap<String, usize>,

    pub reranker_pre_count: usize,
    pub reranker_post_count: usize,
    pub reranker_dropped: Vec<RerankerDrop>,

    pub early_termination_checked: usize,
    pub early_termination_skipped: usize,

    pub merge_web_dup_count: usize,
    pub merge_emb_dup_count: usize,
    pub merge_dup_pairs: Vec<MergeDupPair>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PagePoiCounts {
    pub url: String,
    pub raw: usize,
    pub title_dup: usize,
    pub final_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RerankerDrop {
    pub title: String,
    pub score: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeDupPair {
    pub title: String,
    pub poi_id: String,
}

impl Stats {
    pub fn record_drop(&mut self, reason: &str) {
        *self.drop_reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Formatted text report, matching the original system's end-of-run
    /// summary. Intentionally flat and grep-able rather than nested JSON.
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("keywords: {}", self.keywords.join(", ")));
        lines.push(format!(
            "pages: total={} cache_hits={}",
            self.total_pages, self.cache_hit_pages
        ));
        lines.push(format!(
            "web candidates: raw={} dedup={} final={}",
            self.web_raw_count, self.web_dedup_count, self.web_final_count
        ));
        lines.push(format!(
            "resolution: alias_hits={} resolver_processed={}",
            self.alias_hits, self.resolver_processed
        ));
        if !self.drop_reasons.is_empty() {
            let mut reasons: Vec<_> = self.drop_reasons.iter().collect();
            reasons.sort_by_key(|(k, _)| k.clone());
            let rendered = reasons
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("drops: {rendered}"));
        }
        lines.push(format!(
            "reranker: pre={} post={} dropped={}",
            self.reranker_pre_count,
            self.reranker_post_count,
            self.reranker_dropped.len()
        ));
        lines.push(format!(
            "early termination: checked={} skipped={}",
            self.early_termination_checked, self.early_termination_skipped
        ));
        lines.push(format!(
            "merge dedup: web_internal={} web_to_embedding={}",
            self.merge_web_dup_count, self.merge_emb_dup_count
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_drop_accumulates_by_reason() {
        let mut stats = Stats::default();
        stats.record_drop("summarize_failed");
        stats.record_drop("summarize_failed");
        stats.record_drop("mapper_failed");
        assert_eq!(stats.drop_reasons.get("summarize_failed"), Some(&2));
        assert_eq!(stats.drop_reasons.get("mapper_failed"), Some(&1));
    }

    #[test]
    fn format_report_includes_all_sections() {
        let stats = Stats::default();
        let report = stats.format_report();
        assert!(report.contains("keywords:"));
        assert!(report.contains("reranker:"));
        assert!(report.contains("early termination:"));
        assert!(report.contains("merge dedup:"));
    }
}
