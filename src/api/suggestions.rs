use axum::{extract::State, Json};
use std::sync::Arc;

use crate::db::{SuggestionRequest, User};
use crate::suggestions::{suggest, Suggestion};
use crate::AppState;

use super::error::{ApiError, ApiJson};
use super::validation::{required_text, MAX_TEXT_LEN};

/// POST /api/ai-suggestions
pub async fn create_suggestion(
    State(state): State<Arc<AppState>>,
    _user: User,
    ApiJson(request): ApiJson<SuggestionRequest>,
) -> Result<Json<Suggestion>, ApiError> {
    let prompt = required_text("Prompt", request.prompt.as_deref(), MAX_TEXT_LEN)
        .map_err(|e| ApiError::validation_field("prompt", e))?;

    let suggestion = suggest(&state.store, state.suggestions.as_ref(), &prompt).await?;
    Ok(Json(suggestion))
}
