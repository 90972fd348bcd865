// All LLM prompt text for the evaluation module.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

/// Evaluator persona. The JSON-only fragment is appended at call time.
pub const EVALUATION_ROLE: &str = "You are an expert RFP evaluator. \
    Provide detailed, structured evaluations with scores, reasoning, and actionable fix suggestions.";

pub fn evaluation_system() -> String {
    format!("{EVALUATION_ROLE} {JSON_ONLY_SYSTEM}")
}

/// Builds the user prompt for one section. `criteria` is the pre-numbered rubric list.
pub fn evaluation_prompt(rfp_text: &str, criteria: &str, criteria_count: usize) -> String {
    format!(
        r#"Evaluate the following RFP response section using the rubric below.

RFP RESPONSE SECTION:
```
{rfp_text}
```

RUBRIC ({criteria_count} criteria, in order):
{criteria}

For each criterion give:
- a score from 1 (poor) to 5 (excellent), as an integer
- the reasoning behind the score
- a fix prompt: a short instruction that could be used to revise the section toward a perfect score. Use an empty string when the score is 4 or 5.

Then give a one-paragraph summary of the section and the single fix that would raise the overall quality the most.

Return a JSON object with this EXACT schema (no extra fields):
{{
  "results": [
    {{
      "metric": "Responsiveness",
      "score": 3,
      "reasoning": "Support hours are stated but response times are not.",
      "fix_prompt": "State guaranteed first-response times for each severity level."
    }}
  ],
  "summary": "Overall assessment of the section.",
  "top_fix": "The single highest-impact revision."
}}

HARD RULES:
1. `results` MUST contain exactly {criteria_count} entries, one per rubric criterion, in rubric order
2. `metric` MUST be the criterion name copied verbatim from the rubric (without its number)
3. `score` MUST be an integer between 1 and 5
4. Judge ONLY the text of the section. Do not assume facts that are not stated"#
    )
}
