//! AI-assisted content suggestions for teachers.
//!
//! Answers are memoized per exact prompt in the store. When no provider is
//! configured, or the provider fails, a canned answer is returned instead and
//! not cached, so the prompt is retried once the provider is back.

mod openai;

pub use openai::ChatCompletionsProvider;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::Store;

const SYSTEM_PROMPT: &str = "You help pre-primary school teachers (Nursery, LKG and UKG, ages 3 to 5). \
Answer with short, practical classroom activities, plan ideas or progress comments. \
Keep language simple and positive.";

const FALLBACK_SUGGESTION: &str = "AI suggestions are unavailable right now. Some ideas to get started:\n\
- Circle time with a greeting song and a picture-card discussion\n\
- Sorting games with coloured blocks for early numeracy\n\
- Tracing letters in sand trays for pre-writing practice\n\
- Story time followed by simple questions about the characters\n\
- Outdoor play with hopping and balancing for motor skills";

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("empty response")]
    EmptyChoices,
}

#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, SuggestionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Cache,
    Provider,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub suggestion: String,
    pub source: SuggestionSource,
}

/// Answer `prompt` from the cache, the provider, or the canned fallback, in that order.
pub async fn suggest(
    store: &Store,
    provider: Option<&Arc<dyn SuggestionProvider>>,
    prompt: &str,
) -> Result<Suggestion, sqlx::Error> {
    if let Some(cached) = store.cached_suggestion(prompt).await? {
        return Ok(Suggestion {
            suggestion: cached.response,
            source: SuggestionSource::Cache,
        });
    }

    let Some(provider) = provider else {
        return Ok(fallback());
    };

    match provider.complete(SYSTEM_PROMPT, prompt).await {
        Ok(answer) => {
            store.cache_suggestion(prompt, &answer).await?;
            info!(provider = provider.name(), "Cached new suggestion");
            Ok(Suggestion {
                suggestion: answer,
                source: SuggestionSource::Provider,
            })
        }
        Err(e) => {
            warn!(provider = provider.name(), "Suggestion provider failed: {}", e);
            Ok(fallback())
        }
    }
}

fn fallback() -> Suggestion {
    Suggestion {
        suggestion: FALLBACK_SUGGESTION.to_string(),
        source: SuggestionSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::test_support::store;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SuggestionProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, SuggestionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SuggestionError::EmptyChoices)
            } else {
                Ok(format!("Try this: {}", prompt))
            }
        }
    }

    fn provider(fail: bool) -> (Arc<Scripted>, Arc<dyn SuggestionProvider>) {
        let scripted = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            fail,
        });
        let dynamic: Arc<dyn SuggestionProvider> = scripted.clone();
        (scripted, dynamic)
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let store = store().await;
        let (scripted, provider) = provider(false);

        let first = suggest(&store, Some(&provider), "rainy day games").await.unwrap();
        assert_eq!(first.source, SuggestionSource::Provider);

        let second = suggest(&store, Some(&provider), "rainy day games").await.unwrap();
        assert_eq!(second.source, SuggestionSource::Cache);
        assert_eq!(second.suggestion, first.suggestion);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_fall_back_without_caching() {
        let store = store().await;
        let (scripted, provider) = provider(true);

        let answer = suggest(&store, Some(&provider), "counting songs").await.unwrap();
        assert_eq!(answer.source, SuggestionSource::Fallback);
        assert!(store.cached_suggestion("counting songs").await.unwrap().is_none());

        suggest(&store, Some(&provider), "counting songs").await.unwrap();
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_provider_uses_fallback() {
        let store = store().await;
        let answer = suggest(&store, None, "anything").await.unwrap();
        assert_eq!(answer.source, SuggestionSource::Fallback);
        assert!(!answer.suggestion.is_empty());

        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["source"], "fallback");
    }
}
