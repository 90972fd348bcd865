// RFP evaluation: request validation, rubric parsing, prompt building and
// reply validation. All LLM calls go through llm_client.

pub mod evaluator;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod request;
pub mod rubric;
