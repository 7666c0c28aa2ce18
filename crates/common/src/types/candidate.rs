use serde::{Deserialize, Serialize};

/// A lightweight reference produced by retrieval sources before/after
/// reranking (spec §3 "SearchCandidate"). Carries no persistent identity
/// until promoted to a [`super::Poi`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub source: CandidateSource,
    /// Ordinal, not a probability — merged scores may sum above 1.0 (§9).
    pub score: f64,
}

impl SearchCandidate {
    /// Key used by the Result Merger (§4.13 step 1): prefer `poi_id`, then
    /// `url`, then `title`.
    pub fn merge_key(&self) -> String {
        if let Some(id) = &self.poi_id {
            return format!("poi:{id}");
        }
        if let Some(url) = &self.url {
            return format!("url:{url}");
        }
        format!("title:{}", self.title)
    }

    /// Case-insensitive, whitespace-normalized title used by the three
    /// title-dedup layers (extractor, web_search aggregation, and as a
    /// fallback merge key).
    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }
}

/// Collapse internal whitespace to single spaces, trim, and lowercase —
/// shared by every title-dedup layer so their notion of "same title" agrees.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateSource {
    WebSearch,
    EmbeddingStore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_key_prefers_poi_id_over_url_over_title() {
        let mut c = SearchCandidate {
            poi_id: None,
            title: "N Seoul Tower".into(),
            snippet: String::new(),
            url: None,
            source: CandidateSource::WebSearch,
            score: 0.5,
        };
        assert_eq!(c.merge_key(), "title:N Seoul Tower");

        c.url = Some("https://example.com".into());
        assert_eq!(c.merge_key(), "url:https://example.com");

        c.poi_id = Some("PX123".into());
        assert_eq!(c.merge_key(), "poi:PX123");
    }

    #[test]
    fn normalize_title_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_title("  N   Seoul Tower  "), "n seoul tower");
        assert_eq!(normalize_title("남산타워"), "남산타워");
    }
}
