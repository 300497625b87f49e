use super::Store;
use crate::db::{now_timestamp, AiSuggestion};

impl Store {
    pub async fn cached_suggestion(&self, prompt: &str) -> Result<Option<AiSuggestion>, sqlx::Error> {
        sqlx::query_as::<_, AiSuggestion>("SELECT * FROM ai_suggestions WHERE prompt = ?")
            .bind(prompt)
            .fetch_optional(&self.pool)
            .await
    }

    /// Remember a provider answer. The first answer for a prompt wins.
    pub async fn cache_suggestion(&self, prompt: &str, response: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO ai_suggestions (prompt, response, created_at) VALUES (?, ?, ?)")
            .bind(prompt)
            .bind(response)
            .bind(now_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
