pub mod access;
pub mod api;
pub mod config;
pub mod db;
pub mod media;
pub mod reports;
pub mod suggestions;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;
use std::time::Duration;

use crate::db::Store;
use crate::media::PhotoStore;
use crate::suggestions::{ChatCompletionsProvider, SuggestionProvider};

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub photos: PhotoStore,
    pub suggestions: Option<Arc<dyn SuggestionProvider>>,
}

impl AppState {
    /// Build the state with the external services described by `config`.
    pub fn new(config: Config, store: Store) -> Self {
        let timeout = config.external_timeout();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let photos = PhotoStore::from_config(&config, http);
        let suggestions = match ChatCompletionsProvider::from_config(&config.ai, timeout) {
            Ok(provider) => Some(Arc::new(provider) as Arc<dyn SuggestionProvider>),
            Err(_) => None,
        };

        Self {
            config,
            store,
            photos,
            suggestions,
        }
    }

    /// Replace the suggestion provider
    pub fn with_suggestions(mut self, provider: Option<Arc<dyn SuggestionProvider>>) -> Self {
        self.suggestions = provider;
        self
    }

    /// Replace the photo store
    pub fn with_photos(mut self, photos: PhotoStore) -> Self {
        self.photos = photos;
        self
    }

    pub fn external_timeout(&self) -> Duration {
        self.config.external_timeout()
    }
}
