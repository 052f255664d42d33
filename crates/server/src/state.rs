use std::sync::Arc;

use trialmatch_core::matching::{CacheStore, LlmClient};
use trialmatch_core::{
    Config, SanitizedConfig, SemanticMatchClient, SemanticOptions, SynonymTable, TermError,
    TermStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    term_store: Arc<dyn TermStore>,
    cache_store: Option<Arc<dyn CacheStore>>,
    oracle: Option<Arc<dyn LlmClient>>,
}

impl AppState {
    pub fn new(config: Config, term_store: Arc<dyn TermStore>) -> Self {
        Self {
            config,
            term_store,
            cache_store: None,
            oracle: None,
        }
    }

    /// Persist semantic verdicts here when `llm.persist_to_storage` is set.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn LlmClient>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn term_store(&self) -> &dyn TermStore {
        self.term_store.as_ref()
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    /// A fresh semantic client for one patient run.
    ///
    /// The in-memory cache belongs to the run; verdicts outlive it only
    /// through the cache store.
    pub fn semantic_client(&self) -> Option<SemanticMatchClient> {
        let oracle = self.oracle.clone()?;
        let llm = self.config.llm.clone().unwrap_or_default();

        Some(SemanticMatchClient::with_oracle(
            oracle,
            SemanticOptions {
                persist_to_storage: llm.persist_to_storage,
                store: self.cache_store.clone(),
                max_tokens: Some(llm.max_tokens),
            },
        ))
    }

    /// Synonym groups from every approved term.
    pub fn synonyms(&self) -> Result<SynonymTable, TermError> {
        let approved = self.term_store.approved(None)?;
        Ok(SynonymTable::from_approved(&approved))
    }
}
