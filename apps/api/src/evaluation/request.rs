//! Request body validation for `POST /evaluate`.
//!
//! Every section is checked before any upstream call is made. Error messages
//! name the offending field and the 1-based section number.

use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::evaluation::models::{EvaluationRequest, Section};

/// Parses and validates a raw request body.
///
/// Accepts `{"sections": [{"rfp_text", "rubric"}, ...]}` and, when `sections`
/// is absent or empty, the legacy single-section form `{"rfp_text", "rubric"}`.
pub fn parse_request(body: &[u8]) -> Result<EvaluationRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("No data provided".to_string()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Request body is not valid JSON: {e}")))?;

    let Value::Object(object) = value else {
        return Err(AppError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let raw_sections: &[Value] = match object.get("sections") {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(AppError::BadRequest(
                "sections must be an array".to_string(),
            ))
        }
    };

    let sections = if raw_sections.is_empty() {
        legacy_section(&object).into_iter().collect::<Vec<_>>()
    } else {
        raw_sections
            .iter()
            .enumerate()
            .map(|(i, item)| parse_section(item, i + 1))
            .collect::<Result<Vec<_>, _>>()?
    };

    if sections.is_empty() {
        return Err(AppError::BadRequest("No sections provided".to_string()));
    }

    Ok(EvaluationRequest { sections })
}

fn parse_section(item: &Value, number: usize) -> Result<Section, AppError> {
    let Value::Object(fields) = item else {
        return Err(AppError::BadRequest(format!(
            "section {number} must be a JSON object"
        )));
    };

    let rfp_text = required_text(fields, "rfp_text", number)?;
    let rubric = required_text(fields, "rubric", number)?;

    Ok(Section { rfp_text, rubric })
}

fn required_text(
    fields: &Map<String, Value>,
    key: &str,
    number: usize,
) -> Result<String, AppError> {
    match fields.get(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(AppError::BadRequest(format!(
            "{key} is required for section {number}"
        ))),
        Some(_) => Err(AppError::BadRequest(format!(
            "{key} must be a string in section {number}"
        ))),
    }
}

/// Top-level `rfp_text`/`rubric` are only honoured when both are non-empty strings.
fn legacy_section(object: &Map<String, Value>) -> Option<Section> {
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    match (text("rfp_text"), text("rubric")) {
        (Some(rfp_text), Some(rubric)) => Some(Section {
            rfp_text: rfp_text.to_string(),
            rubric: rubric.to_string(),
        }),
        _ => None,
    }
}
