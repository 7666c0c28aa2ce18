use poi_pipeline_common::types::{Category, SearchCandidate};

use crate::llm::{LlmClient, LlmError};

const SYSTEM_PROMPT: &str = "\
You are given a candidate point of interest and a traveler persona. Produce \
a structured summary tailored to that persona. Respond ONLY with an \
envelope of the form:

<poi>
<name>...</name>
<category>restaurant|cafe|attraction|accommodation|shopping|entertainment|region|other</category>
<description>objective one-sentence description</description>
<address>...</address>
<summary>persona-tailored summary, 2-3 sentences</summary>
<highlights>highlight one, highlight two, highlight three</highlights>
</poi>";

/// Output of the Summarizer (C9), parsed from the LLM's delimited envelope.
#[derive(Clone, Debug)]
pub struct PoiSummary {
    pub name: String,
    pub category: Category,
    pub description: String,
    pub address: String,
    pub summary: String,
    pub highlights: Vec<String>,
}

pub struct Summarizer<'a> {
    llm: &'a LlmClient,
}

impl<'a> Summarizer<'a> {
    pub fn new(llm: &'a LlmClient) -> Self {
        Self { llm }
    }

    /// Parse failures (missing envelope, missing `<name>`) return `None`,
    /// which the Orchestrator treats as a drop.
    pub async fn summarize(
        &self,
        candidate: &SearchCandidate,
        persona: &str,
    ) -> Result<Option<PoiSummary>, LlmError> {
        let user = format!(
            "Persona:\n{persona}\n\nCandidate:\nname: {}\ndescription: {}\n",
            candidate.title, candidate.snippet
        );

        let response = self.llm.complete(SYSTEM_PROMPT, &user).await?;
        Ok(parse_envelope(&response))
    }
}

fn parse_envelope(text: &str) -> Option<PoiSummary> {
    let start = text.find("<poi>")?;
    let end = text.find("</poi>")?;
    let block = &text[start + "<poi>".len()..end];

    let name = extract_tag(block, "name")?;
    if name.trim().is_empty() {
        return None;
    }

    let category = extract_tag(block, "category")
        .and_then(|c| c.trim().parse::<Category>().ok())
        .unwrap_or(Category::Other);
    let description = extract_tag(block, "description").unwrap_or_default();
    let address = extract_tag(block, "address").unwrap_or_default();
    let summary = extract_tag(block, "summary").unwrap_or_default();

    // Known-imperfect heuristic carried over as-is: a highlight containing a
    // literal comma is mis-split.
    let highlights = extract_tag(block, "highlights")
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(PoiSummary {
        name: name.trim().to_string(),
        category,
        description: description.trim().to_string(),
        address: address.trim().to_string(),
        summary: summary.trim().to_string(),
        highlights,
    })
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
    fn parse_envelope_splits_highlights_on_comma() {
        let text = "<poi><name>Blue Bottle</name><category>cafe</category>\
            <description>third-wave coffee shop</description><address>123 Main St</address>\
            <summary>Great for remote work with quiet seating.</summary>\
            <highlights>quiet seating, great wifi, pour-over coffee</highlights></poi>";
        let parsed = parse_envelope(text).unwrap();
        assert_eq!(parsed.name, "Blue Bottle");
        assert_eq!(parsed.category, Category::Cafe);
        assert_eq!(parsed.highlights, vec!["quiet seating", "great wifi", "pour-over coffee"]);
    }

    #[test]
    fn parse_envelope_returns_none_without_name() {
        let text = "<poi><category>cafe</category></poi>";
        assert!(parse_envelope(text).is_none());
    }

    #[test]
    fn parse_envelope_returns_none_without_envelope() {
        assert!(parse_envelope("sorry, I can't help with that").is_none());
    }
}
