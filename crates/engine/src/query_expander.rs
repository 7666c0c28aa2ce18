use crate::llm::{LlmClient, LlmError};

const SYSTEM_PROMPT_TEMPLATE: &str = "\
You generate destination-localized search keywords for travel research. \
Given a traveler persona, a destination, and a travel date range, produce \
5-10 search keywords that reflect seasonal and temporal context for that \
date range (festivals in season, seasonal foods, weather-appropriate \
activities). Every keyword MUST contain the destination name. Respond ONLY \
with an envelope of the form:

<keywords>
<keyword>...</keyword>
...
</keywords>";

/// LLM-backed seasonal/temporal search-keyword generator (C10).
pub struct QueryExpander<'a> {
    llm: &'a LlmClient,
}

impl<'a> QueryExpander<'a> {
    pub fn new(llm: &'a LlmClient) -> Self {
        Self { llm }
    }

    /// Parse failures return an empty list rather than an error.
    pub async fn expand(
        &self,
        persona: &str,
        destination: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<String>, LlmError> {
        let user = format!(
            "Persona:\n{persona}\n\nDestination: {destination}\nStart date: {start_date}\nEnd date: {end_date}\n"
        );

        let response = self.llm.complete(SYSTEM_PROMPT_TEMPLATE, &user).await?;
        Ok(parse_envelope(&response, destination))
    }
}

fn parse_envelope(text: &str, destination: &str) -> Vec<String> {
    let Some(start) = text.find("<keywords>") else {
        return Vec::new();
    };
    let Some(end) = text.find("</keywords>") else {
        return Vec::new();
    };
    let block = &text[start + "<keywords>".len()..end];

    let mut out = Vec::new();
    let mut rest = block;
    while let Some(kstart) = rest.find("<keyword>") {
        let Some(kend_rel) = rest[kstart..].find("</keyword>") else {
            break;
        };
        let keyword = rest[kstart + "<keyword>".len()..kstart + kend_rel].trim().to_string();
        if !keyword.is_empty() && keyword.contains(destination) {
            out.push(keyword);
        }
        rest = &rest[kstart + kend_rel + "</keyword>".len()..];
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_envelope_keeps_only_keywords_containing_destination() {
        let text = "<keywords><keyword>Kyoto autumn foliage</keyword>\
            <keyword>best ramen in town</keyword></keywords>";
        let parsed = parse_envelope(text, "Kyoto");
        assert_eq!(parsed, vec!["Kyoto autumn foliage".to_string()]);
    }

    #[test]
    fn parse_envelope_empty_on_malformed_response() {
        assert!(parse_envelope("not an envelope", "Kyoto").is_empty());
    }
}
