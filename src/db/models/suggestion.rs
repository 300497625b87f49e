use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Memoized provider answer, keyed by the exact prompt text
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AiSuggestion {
    pub prompt: String,
    pub response: String,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionRequest {
    pub prompt: Option<String>,
}
