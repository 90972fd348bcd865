use serde::{Deserialize, Deserializer, Serialize};

/// One RFP response section paired with the rubric it is judged against.
/// Both fields are stored trimmed and are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub rfp_text: String,
    pub rubric: String,
}

/// A validated, non-empty, ordered batch of sections.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub sections: Vec<Section>,
}

/// A single rubric line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub name: String,
    pub description: Option<String>,
}

/// The model's verdict for one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric: String,
    /// 1 – 5 inclusive; enforced after parsing.
    pub score: u8,
    pub reasoning: String,
    /// Empty when no revision is suggested. Models sometimes send `null` here.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fix_prompt: String,
}

/// Structured evaluation of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub results: Vec<MetricResult>,
    pub summary: String,
    pub top_fix: String,
}

/// An evaluation tagged with the 0-based index of the section it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct SectionEvaluation {
    pub section_index: usize,
    #[serde(flatten)]
    pub evaluation: EvaluationResponse,
}

/// Response body for `POST /evaluate`.
///
/// A single-section request gets the bare `EvaluationResponse`; a batch gets
/// `{"sections": [...]}` in request order.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EvaluateReply {
    Single(EvaluationResponse),
    Batch { sections: Vec<SectionEvaluation> },
}

impl EvaluateReply {
    pub fn from_evaluations(mut evaluations: Vec<EvaluationResponse>) -> Self {
        if evaluations.len() == 1 {
            if let Some(only) = evaluations.pop() {
                return EvaluateReply::Single(only);
            }
        }
        EvaluateReply::Batch {
            sections: evaluations
                .into_iter()
                .enumerate()
                .map(|(section_index, evaluation)| SectionEvaluation {
                    section_index,
                    evaluation,
                })
                .collect(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
