//! Axum route handlers for the Evaluation API.

use axum::{body::Bytes, extract::rejection::BytesRejection, extract::State, Json};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::evaluator::evaluate_request;
use crate::evaluation::models::EvaluateReply;
use crate::evaluation::request::parse_request;
use crate::state::AppState;

/// POST /evaluate (also mounted at /.netlify/functions/evaluate)
///
/// The body is read raw so that malformed JSON and oversized bodies are reported
/// as JSON errors rather than Axum's plain-text extractor rejections.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<EvaluateReply>, AppError> {
    let request = parse_request(&body?)?;

    let span = info_span!(
        "evaluate",
        request_id = %Uuid::new_v4(),
        sections = request.sections.len()
    );

    async move {
        let evaluations = evaluate_request(state.llm.as_ref(), &request).await?;
        info!(
            "Evaluated {} sections ({} metrics)",
            evaluations.len(),
            evaluations.iter().map(|e| e.results.len()).sum::<usize>()
        );
        Ok(Json(EvaluateReply::from_evaluations(evaluations)))
    }
    .instrument(span)
    .await
}

/// Any method other than POST on an evaluate path.
pub async fn handle_method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
