use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::CompletionBackend;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Upstream model. `LlmClient` in production, a stub in tests.
    pub llm: Arc<dyn CompletionBackend>,
    pub config: Config,
}
