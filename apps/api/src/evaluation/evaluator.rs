//! Section evaluation: orchestrates prompt → upstream call → validated result.
//!
//! Flow per request: parse every rubric → for each section in order:
//!       build prompt → one upstream call → parse + validate reply.
//!
//! Sections are evaluated sequentially. The first failure aborts the request;
//! no partial results are returned.

use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::evaluation::models::{
    Criterion, EvaluationRequest, EvaluationResponse, MetricResult, Section,
};
use crate::evaluation::prompts::{evaluation_prompt, evaluation_system};
use crate::evaluation::rubric::parse_rubric;
use crate::llm_client::{strip_json_fences, CompletionBackend};

/// Longest slice of a rejected model reply written to the log.
const MAX_LOGGED_REPLY_CHARS: usize = 2000;

const MIN_SCORE: u8 = 1;
const MAX_SCORE: u8 = 5;

/// Evaluates every section of a validated request, one upstream call per section.
///
/// Rubrics are parsed up front so a bad rubric in any section fails before
/// the first upstream call.
pub async fn evaluate_request(
    backend: &dyn CompletionBackend,
    request: &EvaluationRequest,
) -> Result<Vec<EvaluationResponse>, AppError> {
    let rubrics = request
        .sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let criteria = parse_rubric(&section.rubric);
            if criteria.is_empty() {
                Err(AppError::BadRequest(format!(
                    "Rubric for section {} has no criteria",
                    i + 1
                )))
            } else {
                Ok(criteria)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let system = evaluation_system();
    let mut evaluations = Vec::with_capacity(request.sections.len());

    for (i, (section, criteria)) in request.sections.iter().zip(&rubrics).enumerate() {
        info!(
            "Evaluating section {}/{} against {} criteria",
            i + 1,
            request.sections.len(),
            criteria.len()
        );
        evaluations.push(evaluate_section(backend, &system, section, criteria).await?);
    }

    Ok(evaluations)
}

async fn evaluate_section(
    backend: &dyn CompletionBackend,
    system: &str,
    section: &Section,
    criteria: &[Criterion],
) -> Result<EvaluationResponse, AppError> {
    let prompt = build_prompt(section, criteria);
    let reply = backend.complete(&prompt, system).await?;
    parse_evaluation(&reply, criteria)
}

/// Fills the evaluation prompt with the section text and the numbered criteria.
pub fn build_prompt(section: &Section, criteria: &[Criterion]) -> String {
    let numbered = criteria
        .iter()
        .enumerate()
        .map(|(i, c)| match &c.description {
            Some(description) => format!("{}. {}: {}", i + 1, c.name, description),
            None => format!("{}. {}", i + 1, c.name),
        })
        .collect::<Vec<_>>()
        .join("\n");

    evaluation_prompt(&section.rfp_text, &numbered, criteria.len())
}

/// Parses the model's reply and checks it against the rubric.
///
/// Rejects non-JSON, wrong shape, out-of-range scores, blank metric names and
/// a result count that differs from the criterion count. Results that name
/// every criterion but arrive out of order are put back in rubric order.
pub fn parse_evaluation(
    reply: &str,
    criteria: &[Criterion],
) -> Result<EvaluationResponse, AppError> {
    let mut evaluation: EvaluationResponse = serde_json::from_str(strip_json_fences(reply))
        .map_err(|e| reject(reply, format!("reply is not a valid evaluation object: {e}")))?;

    if evaluation.results.len() != criteria.len() {
        return Err(reject(
            reply,
            format!(
                "expected {} results (one per rubric criterion), got {}",
                criteria.len(),
                evaluation.results.len()
            ),
        ));
    }

    for result in &evaluation.results {
        if result.metric.trim().is_empty() {
            return Err(reject(reply, "a result has an empty metric name".to_string()));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&result.score) {
            return Err(reject(
                reply,
                format!(
                    "score {} for '{}' is outside {MIN_SCORE}..={MAX_SCORE}",
                    result.score, result.metric
                ),
            ));
        }
    }

    evaluation.results = align_to_rubric(evaluation.results, criteria);
    Ok(evaluation)
}

/// Reorders results into rubric order when each one names a distinct criterion.
/// Otherwise the model's order is kept.
fn align_to_rubric(results: Vec<MetricResult>, criteria: &[Criterion]) -> Vec<MetricResult> {
    let positions: Option<Vec<usize>> = results
        .iter()
        .map(|r| {
            criteria
                .iter()
                .position(|c| c.name.trim().eq_ignore_ascii_case(r.metric.trim()))
        })
        .collect();

    let Some(positions) = positions else {
        return results;
    };

    let mut seen = vec![false; criteria.len()];
    for &p in &positions {
        if std::mem::replace(&mut seen[p], true) {
            return results;
        }
    }

    if positions.iter().enumerate().all(|(i, &p)| i == p) {
        return results;
    }

    warn!("Model returned criteria out of rubric order; reordering");
    let mut slots: Vec<Option<MetricResult>> = vec![None; criteria.len()];
    for (result, p) in results.into_iter().zip(positions) {
        slots[p] = Some(result);
    }
    slots.into_iter().flatten().collect()
}

fn reject(reply: &str, reason: String) -> AppError {
    error!(
        "Rejecting model reply ({reason}): {:?}",
        reply.chars().take(MAX_LOGGED_REPLY_CHARS).collect::<String>()
    );
    AppError::MalformedUpstreamResponse(reason)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm_client::LlmError;

    /// Replays canned replies in order and records every prompt it sees.
    struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(LlmError::EmptyContent))
        }
    }

    fn criteria(names: &[&str]) -> Vec<Criterion> {
        names
            .iter()
            .map(|n| Criterion {
                name: n.to_string(),
                description: None,
            })
            .collect()
    }

    fn reply(metrics: &[(&str, u8)]) -> String {
        serde_json::json!({
            "results": metrics.iter().map(|(m, s)| serde_json::json!({
                "metric": m,
                "score": s,
                "reasoning": format!("Reasoning for {m}"),
                "fix_prompt": if *s < 4 { format!("Improve {m}") } else { String::new() },
            })).collect::<Vec<_>>(),
            "summary": "Solid but vague.",
            "top_fix": "Quantify response times."
        })
        .to_string()
    }

    fn section(rubric: &str) -> Section {
        Section {
            rfp_text: "We offer 24/7 support.".to_string(),
            rubric: rubric.to_string(),
        }
    }

    #[test]
    fn test_conforming_reply_round_trips_unchanged() {
        let text = reply(&[("Responsiveness", 3), ("Clarity", 4)]);
        let expected: EvaluationResponse = serde_json::from_str(&text).unwrap();

        let parsed = parse_evaluation(&text, &criteria(&["Responsiveness", "Clarity"])).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_fenced_reply_is_accepted() {
        let text = format!("```json\n{}\n```", reply(&[("Clarity", 5)]));
        let parsed = parse_evaluation(&text, &criteria(&["Clarity"])).unwrap();
        assert_eq!(parsed.results[0].metric, "Clarity");
        assert_eq!(parsed.results[0].fix_prompt, "");
    }

    #[test]
    fn test_markdown_table_reply_is_malformed() {
        let text = "| Metric | Score | Reasoning | Fix Prompt |\n|---|---|---|---|\n| Clarity | 4 | ok | |";
        let err = parse_evaluation(text, &criteria(&["Clarity"])).unwrap_err();
        assert!(matches!(err, AppError::MalformedUpstreamResponse(_)));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let text = r#"{"scores": [1, 2], "summary": "x"}"#;
        let err = parse_evaluation(text, &criteria(&["A", "B"])).unwrap_err();
        assert!(matches!(err, AppError::MalformedUpstreamResponse(_)));
    }

    #[test]
    fn test_result_count_must_match_rubric() {
        let text = reply(&[("Responsiveness", 3)]);
        match parse_evaluation(&text, &criteria(&["Responsiveness", "Clarity"])) {
            Err(AppError::MalformedUpstreamResponse(reason)) => {
                assert!(reason.contains("expected 2 results"), "{reason}")
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_score_is_malformed() {
        for bad in [0, 6] {
            let text = reply(&[("Clarity", bad)]);
            let err = parse_evaluation(&text, &criteria(&["Clarity"])).unwrap_err();
            assert!(matches!(err, AppError::MalformedUpstreamResponse(_)), "score {bad}");
        }
    }

    #[test]
    fn test_blank_metric_is_malformed() {
        let text = reply(&[("  ", 3)]);
        let err = parse_evaluation(&text, &criteria(&["Clarity"])).unwrap_err();
        assert!(matches!(err, AppError::MalformedUpstreamResponse(_)));
    }

    #[test]
    fn test_out_of_order_results_are_put_in_rubric_order() {
        let text = reply(&[("clarity", 4), ("Pricing", 2), ("Responsiveness", 3)]);
        let parsed =
            parse_evaluation(&text, &criteria(&["Responsiveness", "Clarity", "Pricing"])).unwrap();
        let metrics: Vec<_> = parsed.results.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, vec!["Responsiveness", "clarity", "Pricing"]);
    }

    #[test]
    fn test_unrecognised_names_keep_model_order() {
        let text = reply(&[("Speed", 4), ("Legibility", 2)]);
        let parsed = parse_evaluation(&text, &criteria(&["Responsiveness", "Clarity"])).unwrap();
        let metrics: Vec<_> = parsed.results.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, vec!["Speed", "Legibility"]);
    }

    #[test]
    fn test_duplicate_names_keep_model_order() {
        let text = reply(&[("Clarity", 4), ("Clarity", 2)]);
        let parsed = parse_evaluation(&text, &criteria(&["Responsiveness", "Clarity"])).unwrap();
        assert_eq!(parsed.results[0].score, 4);
        assert_eq!(parsed.results[1].score, 2);
    }

    #[test]
    fn test_build_prompt_numbers_criteria_with_descriptions() {
        let criteria = vec![
            Criterion {
                name: "Responsiveness".to_string(),
                description: Some("response times are stated".to_string()),
            },
            Criterion {
                name: "Clarity".to_string(),
                description: None,
            },
        ];
        let prompt = build_prompt(&section("ignored"), &criteria);
        assert!(prompt.contains("1. Responsiveness: response times are stated\n2. Clarity"));
        assert!(prompt.contains("We offer 24/7 support."));
    }

    #[tokio::test]
    async fn test_one_upstream_call_per_section_in_order() {
        let backend = ScriptedBackend::new(vec![
            Ok(reply(&[("Responsiveness", 3), ("Clarity", 4)])),
            Ok(reply(&[("Pricing", 2)])),
        ]);
        let request = EvaluationRequest {
            sections: vec![section("- Responsiveness\n- Clarity"), section("- Pricing")],
        };

        let evaluations = evaluate_request(&backend, &request).await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations[0].results.len(), 2);
        assert_eq!(evaluations[1].results[0].metric, "Pricing");

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("1. Responsiveness\n2. Clarity"));
        assert!(prompts[1].contains("1. Pricing"));
    }

    #[tokio::test]
    async fn test_empty_rubric_in_later_section_fails_before_any_call() {
        let backend = ScriptedBackend::new(vec![Ok(reply(&[("Clarity", 4)]))]);
        let request = EvaluationRequest {
            sections: vec![section("- Clarity"), section("Criteria:\n-")],
        };

        let err = evaluate_request(&backend, &request).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("section 2")));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_in_any_section_aborts_without_partial_results() {
        let backend = ScriptedBackend::new(vec![
            Ok(reply(&[("Clarity", 4)])),
            Ok("Sorry, I cannot help with that.".to_string()),
            Ok(reply(&[("Pricing", 2)])),
        ]);
        let request = EvaluationRequest {
            sections: vec![section("- Clarity"), section("- Tone"), section("- Pricing")],
        };

        let err = evaluate_request(&backend, &request).await.unwrap_err();

        assert!(matches!(err, AppError::MalformedUpstreamResponse(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upstream_error_is_classified() {
        let backend = ScriptedBackend::new(vec![Err(LlmError::Api {
            status: 401,
            code: Some("invalid_api_key".to_string()),
            message: "Incorrect API key provided".to_string(),
        })]);
        let request = EvaluationRequest {
            sections: vec![section("- Clarity")],
        };

        let err = evaluate_request(&backend, &request).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamRejected(_)));
    }
}
