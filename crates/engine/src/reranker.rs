use poi_pipeline_common::types::SearchCandidate;

use crate::llm::{LlmClient, LlmError};

const SYSTEM_PROMPT: &str = "\
You score how relevant each candidate point of interest is to a traveler \
persona, on a scale from 0.0 (irrelevant) to 1.0 (perfect match). Respond \
ONLY with an envelope of the form:

<scores>
<score index=\"0\">0.0-1.0</score>
...
</scores>

Emit exactly one <score> per candidate, in the same order as given, indexed from 0.";

/// A candidate dropped by the Reranker for statistics (spec §4.12).
#[derive(Clone, Debug)]
pub struct RerankerDrop {
    pub title: String,
    pub score: f64,
}

/// LLM-backed relevance scorer (C12), invoked in fixed-size batches.
pub struct Reranker<'a> {
    llm: &'a LlmClient,
}

impl<'a> Reranker<'a> {
    pub fn new(llm: &'a LlmClient) -> Self {
        Self { llm }
    }

    /// Scores `candidates` in batches of `batch_size`, drops anything below
    /// `min_score`, and returns the survivors sorted descending by score
    /// alongside the drop list for stats.
    pub async fn rerank(
        &self,
        candidates: Vec<SearchCandidate>,
        persona: &str,
        batch_size: usize,
        min_score: f64,
    ) -> Result<(Vec<SearchCandidate>, Vec<RerankerDrop>), LlmError> {
        let mut survivors = Vec::new();
        let mut drops = Vec::new();

        for batch in candidates.chunks(batch_size.max(1)) {
            let scores = self.score_batch(batch, persona).await?;

            for (candidate, score) in batch.iter().zip(scores.into_iter()) {
                if score >= min_score {
                    let mut scored = candidate.clone();
                    scored.score = score;
                    survivors.push(scored);
                } else {
                    drops.push(RerankerDrop {
                        title: candidate.title.clone(),
                        score,
                    });
                }
            }
        }

        survivors.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok((survivors, drops))
    }

    async fn score_batch(
        &self,
        batch: &[SearchCandidate],
        persona: &str,
    ) -> Result<Vec<f64>, LlmError> {
        let mut user = format!("Persona:\n{persona}\n\nCandidates:\n");
        for (i, candidate) in batch.iter().enumerate() {
            user.push_str(&format!(
                "{i}. {} — {}\n",
                candidate.title, candidate.snippet
            ));
        }

        let response = self.llm.complete(SYSTEM_PROMPT, &user).await?;
        Ok(parse_scores(&response, batch.len()))
    }
}

/// Parses `<score index="N">value</score>` tags. Missing or unparsable
/// indices default to `0.0` (dropped by any non-zero `min_score`), so a
/// malformed response degrades to "drop everything" rather than panicking.
fn parse_scores(text: &str, expected: usize) -> Vec<f64> {
    let mut scores = vec![0.0f64; expected];
    let mut rest = text;

    while let Some(start) = rest.find("<score") {
        let Some(tag_end) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start..start + tag_end];
        let Some(close) = rest[start + tag_end..].find("</score>") else {
            break;
        };
        let value_str = rest[start + tag_end + 1..start + tag_end + close].trim();

        if let Some(index) = extract_index(tag) {
            if let Ok(value) = value_str.parse::<f64>() {
                if index < scores.len() {
                    scores[index] = value.clamp(0.0, 1.0);
                }
            }
        }

        rest = &rest[start + tag_end + close + "</score>".len()..];
    }

    scores
}

fn extract_index(tag: &str) -> Option<usize> {
    let key = "index=\"";
    let start = tag.find(key)? + key.len();
    let end = tag[start..].find('"')? + start;
    tag[start..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scores_reads_indexed_values() {
        let text = r#"<scores><score index="0">0.9</score><score index="1">0.2</score></scores>"#;
        assert_eq!(parse_scores(text, 2), vec![0.9, 0.2]);
    }

    #[test]
    fn parse_scores_defaults_missing_entries_to_zero() {
        let text = r#"<scores><score index="0">0.9</score></scores>"#;
        assert_eq!(parse_scores(text, 3), vec![0.9, 0.0, 0.0]);
    }

    #[test]
    fn parse_scores_clamps_out_of_range_values() {
        let text = r#"<scores><score index="0">1.7</score></scores>"#;
        assert_eq!(parse_scores(text, 1), vec![1.0]);
    }
}
