use poi_pipeline_common::types::{CandidateSource, SearchCandidate};

use crate::llm::{LlmClient, LlmError};

const SYSTEM_PROMPT: &str = "\
You extract named points of interest (restaurants, cafes, attractions, \
hotels, museums, parks, shopping areas, entertainment venues) mentioned in \
a piece of travel-related text. Do not extract generic place names (a city \
or country) unless they refer to a specific venue. Respond ONLY with an \
envelope of the form:

<candidates>
<candidate><name>...</name><description>...</description></candidate>
...
</candidates>

If no POIs are mentioned, respond with an empty <candidates></candidates>.";

/// LLM-backed structured extractor (C8). Converts cleaned page markdown
/// into a list of named-place candidates.
pub struct Extractor<'a> {
    llm: &'a LlmClient,
}

impl<'a> Extractor<'a> {
    pub fn new(llm: &'a LlmClient) -> Self {
        Self { llm }
    }

    /// Title-level deduplication (case-insensitive, whitespace-normalized)
    /// is applied before returning.
    pub async fn extract(
        &self,
        markdown: &str,
        source_url: Option<&str>,
    ) -> Result<Vec<SearchCandidate>, LlmError> {
        if markdown.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = self.llm.complete(SYSTEM_PROMPT, markdown).await?;
        let parsed = parse_envelope(&response);

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (name, description) in parsed {
            let normalized = poi_pipeline_common::types::normalize_name(&name);
            if normalized.is_empty() || !seen.insert(normalized) {
                continue;
            }
            out.push(SearchCandidate {
                poi_id: None,
                title: name,
                snippet: description,
                url: source_url.map(String::from),
                source: CandidateSource::WebSearch,
                score: 0.5,
            });
        }

        Ok(out)
    }
}

fn parse_envelope(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("<candidate>") {
        let Some(end_rel) = rest[start..].find("</candidate>") else {
            break;
        };
        let block = &rest[start + "<candidate>".len()..start + end_rel];

        let name = extract_tag(block, "name").unwrap_or_default();
        let description = extract_tag(block, "description").unwrap_or_default();

        if !name.trim().is_empty() {
            out.push((name.trim().to_string(), description.trim().to_string()));
        }

        rest = &rest[start + end_rel + "</candidate>".len()..];
    }

    out
}

fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    Some(block[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_envelope_extracts_name_and_description() {
        let text = "<candidates>\
            <candidate><name>Ebisoba Ichigen</name><description>famous ramen shop</description></candidate>\
            <candidate><name>Ramen Shingetsu</name><description>shio ramen</description></candidate>\
            </candidates>";
        let parsed = parse_envelope(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "Ebisoba Ichigen");
    }

    #[test]
    fn parse_envelope_handles_empty_envelope() {
        assert!(parse_envelope("<candidates></candidates>").is_empty());
    }
}
