//! Cached client for the semantic similarity oracle.
//!
//! The client answers "do these two medical terms denote the same concept?"
//! by asking the oracle once per distinct (patient term, criterion term,
//! match type) triple and remembering successful verdicts. Failures are
//! reported in-band and never cached, so a later call retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache_store::{CacheStore, CacheStoreError};
use super::llm::{AnthropicClient, CompletionRequest, LlmClient, LlmError};
use super::types::{CacheKey, CacheStats, CachedVerdict, SemanticMatch, SemanticQuery};
use crate::config::LlmConfig;
use crate::metrics::{CACHE_LOOKUPS, ORACLE_CALLS, ORACLE_DURATION, ORACLE_TOKENS};
use crate::results::clamp_confidence;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

const DEFAULT_MAX_TOKENS: u32 = 256;

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON object pattern is valid"));

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Cache store error: {0}")]
    Store(#[from] CacheStoreError),
}

/// Options for [`SemanticMatchClient`].
#[derive(Clone, Default)]
pub struct SemanticOptions {
    /// Mirror verdicts into `store` and preload them at construction.
    pub persist_to_storage: bool,
    /// Backing store used when `persist_to_storage` is set.
    pub store: Option<Arc<dyn CacheStore>>,
    /// Maximum tokens for each oracle response.
    pub max_tokens: Option<u32>,
}

impl SemanticOptions {
    pub fn persisted(store: Arc<dyn CacheStore>) -> Self {
        Self {
            persist_to_storage: true,
            store: Some(store),
            max_tokens: None,
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CachedVerdict>,
    hits: u64,
    misses: u64,
}

/// Build the oracle client described by `config`.
///
/// Fails with [`SemanticError::Authentication`] when no API key is set.
pub fn oracle_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, SemanticError> {
    let api_key = require_api_key(config.api_key.as_deref())?;
    let mut client = AnthropicClient::new(api_key, config.model.clone())
        .with_timeout(Duration::from_secs(u64::from(config.timeout_secs)));
    if let Some(api_base) = &config.api_base {
        client = client.with_api_base(api_base.clone());
    }
    Ok(Arc::new(client))
}

fn require_api_key(api_key: Option<&str>) -> Result<&str, SemanticError> {
    match api_key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(SemanticError::Authentication(
            "an API key is required for semantic matching".to_string(),
        )),
    }
}

/// Semantic similarity client with a private verdict cache.
pub struct SemanticMatchClient {
    oracle: Arc<dyn LlmClient>,
    model: RwLock<String>,
    max_tokens: u32,
    state: Mutex<CacheState>,
    store: Option<Arc<dyn CacheStore>>,
}

impl SemanticMatchClient {
    /// Create a client talking to the Anthropic API.
    pub fn new(
        api_key: &str,
        model: Option<&str>,
        options: SemanticOptions,
    ) -> Result<Self, SemanticError> {
        let api_key = require_api_key(Some(api_key))?;
        let model = model.unwrap_or(DEFAULT_MODEL);
        let oracle = Arc::new(AnthropicClient::new(api_key, model));
        Ok(Self::with_oracle(oracle, options))
    }

    /// Create a client from the `[llm]` configuration section.
    pub fn from_config(
        config: &LlmConfig,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self, SemanticError> {
        let oracle = oracle_from_config(config)?;
        Ok(Self::with_oracle(
            oracle,
            SemanticOptions {
                persist_to_storage: config.persist_to_storage,
                store,
                max_tokens: Some(config.max_tokens),
            },
        ))
    }

    /// Create a client over any oracle implementation.
    pub fn with_oracle(oracle: Arc<dyn LlmClient>, options: SemanticOptions) -> Self {
        let store = if options.persist_to_storage {
            if options.store.is_none() {
                warn!("persist_to_storage is set but no cache store was provided");
            }
            options.store
        } else {
            None
        };

        let client = Self {
            model: RwLock::new(oracle.model().to_string()),
            oracle,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            state: Mutex::new(CacheState::default()),
            store,
        };

        if let Err(e) = client.load_persisted() {
            warn!(error = %e, "Failed to load persisted semantic cache");
        }

        client
    }

    /// Load persisted verdicts into memory. Returns the number loaded.
    pub fn load_persisted(&self) -> Result<usize, SemanticError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let entries = store.load_all()?;
        let count = entries.len();
        self.state().entries.extend(entries);
        info!(count, "Loaded persisted semantic cache");
        Ok(count)
    }

    /// Ask whether `patient_term` and `criterion_term` denote the same concept.
    ///
    /// Never fails: transport, API and parse problems come back as a
    /// non-match with `error: true`.
    pub async fn semantic_match(
        &self,
        patient_term: &str,
        criterion_term: &str,
        match_type: &str,
    ) -> SemanticMatch {
        let key = CacheKey::new(patient_term, criterion_term, match_type);

        if let Some(verdict) = self.lookup(&key) {
            debug!(patient_term, criterion_term, match_type, "Semantic cache hit");
            return verdict.to_match(true);
        }
        debug!(patient_term, criterion_term, match_type, "Semantic cache miss");

        let request = CompletionRequest::new(build_prompt(patient_term, criterion_term, match_type))
            .with_system(SYSTEM_PROMPT)
            .with_model(self.model())
            .with_max_tokens(self.max_tokens);

        let start = Instant::now();
        let response = self.oracle.complete(request).await;
        ORACLE_DURATION
            .with_label_values(&[])
            .observe(start.elapsed().as_secs_f64());

        let text = match response {
            Ok(response) => {
                let usage = &response.usage;
                ORACLE_TOKENS
                    .with_label_values(&["input"])
                    .inc_by(u64::from(usage.input_tokens));
                ORACLE_TOKENS
                    .with_label_values(&["output"])
                    .inc_by(u64::from(usage.output_tokens));
                debug!(
                    model = %response.model,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Semantic oracle answered"
                );
                response.text
            }
            Err(LlmError::Api { status, message }) => {
                ORACLE_CALLS.with_label_values(&["api_error"]).inc();
                warn!(status, %message, "Semantic oracle returned an error");
                return SemanticMatch::failed(format!("API error: {}", message));
            }
            Err(LlmError::Json(e)) => {
                ORACLE_CALLS.with_label_values(&["parse_error"]).inc();
                warn!(error = %e, "Semantic oracle response envelope was malformed");
                return SemanticMatch::failed(format!("Failed to parse oracle response: {}", e));
            }
            Err(e) => {
                ORACLE_CALLS.with_label_values(&["transport_error"]).inc();
                warn!(error = %e, "Semantic oracle request failed");
                return SemanticMatch::failed(format!("Request failed: {}", e));
            }
        };

        let verdict = match parse_verdict(&text) {
            Ok(verdict) => verdict,
            Err(e) => {
                ORACLE_CALLS.with_label_values(&["parse_error"]).inc();
                warn!(error = %e, response = %text, "Could not parse semantic verdict");
                return SemanticMatch::failed(format!("Failed to parse oracle response: {}", e));
            }
        };
        ORACLE_CALLS.with_label_values(&["ok"]).inc();

        self.remember(key, verdict.clone());
        verdict.to_match(false)
    }

    /// Run every query concurrently. Results follow input order.
    pub async fn batch_semantic_match(&self, queries: &[SemanticQuery]) -> Vec<SemanticMatch> {
        join_all(queries.iter().map(|q| {
            self.semantic_match(&q.patient_term, &q.criterion_term, &q.match_type)
        }))
        .await
    }

    /// Active model identifier.
    pub fn model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Switch the model for subsequent oracle calls. The cache is kept.
    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.write().unwrap_or_else(|e| e.into_inner()) = model.into();
    }

    /// Drop all cached verdicts and reset the hit/miss counters.
    pub fn clear_cache(&self) {
        {
            let mut state = self.state();
            state.entries.clear();
            state.hits = 0;
            state.misses = 0;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to clear persisted semantic cache");
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats::new(state.entries.len(), state.hits, state.misses)
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a key, counting the hit or miss.
    fn lookup(&self, key: &CacheKey) -> Option<CachedVerdict> {
        let mut state = self.state();
        match state.entries.get(key).cloned() {
            Some(verdict) => {
                state.hits += 1;
                CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                Some(verdict)
            }
            None => {
                state.misses += 1;
                CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                None
            }
        }
    }

    /// Store a verdict. Concurrent writers for one key: the last one wins.
    fn remember(&self, key: CacheKey, verdict: CachedVerdict) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put(&key, &verdict) {
                warn!(error = %e, "Failed to persist semantic verdict");
            }
        }
        self.state().entries.insert(key, verdict);
    }
}

const SYSTEM_PROMPT: &str = r#"You are a clinical terminology expert. Decide whether a patient-reported term and a clinical trial eligibility term refer to the same medical concept, or whether the patient term is a specific instance of the trial term.

Consider synonyms, abbreviations, lay descriptions and brand versus generic drug names. Be conservative: unrelated or only loosely related concepts do not match.

Respond with JSON only:
{"match": true, "confidence": 0.95, "reasoning": "Brief explanation"}"#;

fn build_prompt(patient_term: &str, criterion_term: &str, match_type: &str) -> String {
    format!(
        "Match type: {}\nPatient term: \"{}\"\nTrial criterion term: \"{}\"\n\nDo these refer to the same {}?",
        match_type, patient_term, criterion_term, match_type
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(rename = "match")]
    matched: bool,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parse oracle text into a verdict, tolerating prose around the JSON object.
fn parse_verdict(text: &str) -> Result<CachedVerdict, String> {
    let json = JSON_OBJECT
        .find(text)
        .map(|m| m.as_str())
        .ok_or_else(|| "no JSON object in response".to_string())?;

    let raw: RawVerdict = serde_json::from_str(json).map_err(|e| e.to_string())?;

    Ok(CachedVerdict {
        matched: raw.matched,
        confidence: clamp_confidence(raw.confidence),
        reasoning: raw.reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::cache_store::SqliteCacheStore;
    use crate::testing::MockLlmClient;

    fn verdict_json(matched: bool, confidence: f64) -> String {
        format!(
            r#"{{"match": {}, "confidence": {}, "reasoning": "test"}}"#,
            matched, confidence
        )
    }

    fn client_with(mock: &Arc<MockLlmClient>) -> SemanticMatchClient {
        SemanticMatchClient::with_oracle(mock.clone(), SemanticOptions::default())
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = SemanticMatchClient::new("", None, SemanticOptions::default());
        assert!(matches!(result, Err(SemanticError::Authentication(_))));

        let result = SemanticMatchClient::new("   ", None, SemanticOptions::default());
        assert!(matches!(result, Err(SemanticError::Authentication(_))));
    }

    #[test]
    fn test_new_uses_default_model() {
        let client = SemanticMatchClient::new("sk-test", None, SemanticOptions::default()).unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);

        let client =
            SemanticMatchClient::new("sk-test", Some("claude-3-5-sonnet"), SemanticOptions::default())
                .unwrap();
        assert_eq!(client.model(), "claude-3-5-sonnet");
    }

    #[test]
    fn test_from_config_without_key_fails() {
        let config = LlmConfig::default();
        let result = SemanticMatchClient::from_config(&config, None);
        assert!(matches!(result, Err(SemanticError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_second_identical_call_is_cached() {
        let mock = Arc::new(MockLlmClient::with_response(verdict_json(true, 0.9)));
        let client = client_with(&mock);

        let first = client.semantic_match("Breast Cancer", "malignant tumors", "condition").await;
        assert!(first.matched);
        assert!(!first.from_cache);
        assert_eq!(first.confidence, 0.9);

        let second = client.semantic_match("breast cancer ", "Malignant Tumors", "condition").await;
        assert!(second.matched);
        assert!(second.from_cache);
        assert_eq!(mock.call_count(), 1);

        let stats = client.cache_stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_oracle_tokens_are_counted() {
        let input = ORACLE_TOKENS.with_label_values(&["input"]);
        let output = ORACLE_TOKENS.with_label_values(&["output"]);
        let (input_before, output_before) = (input.get(), output.get());

        let mock = Arc::new(MockLlmClient::with_response(verdict_json(false, 0.7)));
        let client = client_with(&mock);
        client.semantic_match("gout", "arthritis", "condition").await;

        // The mock reports 120 input and 40 output tokens per call
        assert!(input.get() >= input_before + 120);
        assert!(output.get() >= output_before + 40);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_new_call() {
        let mock = Arc::new(MockLlmClient::with_response(verdict_json(true, 0.9)));
        let client = client_with(&mock);

        client.semantic_match("asthma", "copd", "condition").await;
        client.clear_cache();
        assert_eq!(client.cache_stats(), CacheStats::new(0, 0, 0));

        let again = client.semantic_match("asthma", "copd", "condition").await;
        assert!(!again.from_cache);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_match_type_is_part_of_key() {
        let mock = Arc::new(MockLlmClient::with_response(verdict_json(false, 0.7)));
        let client = client_with(&mock);

        client.semantic_match("aspirin", "nsaid", "condition").await;
        let other = client.semantic_match("aspirin", "nsaid", "treatment").await;
        assert!(!other.from_cache);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let mock = Arc::new(MockLlmClient::with_response(verdict_json(true, 1.7)));
        let client = client_with(&mock);
        let result = client.semantic_match("a", "b", "condition").await;
        assert_eq!(result.confidence, 1.0);

        let mock = Arc::new(MockLlmClient::with_response(verdict_json(false, -0.4)));
        let client = client_with(&mock);
        let result = client.semantic_match("a", "b", "condition").await;
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_cached() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::Http("connection refused".to_string()));
        mock.push_response(verdict_json(true, 0.8));
        let client = client_with(&mock);

        let failed = client.semantic_match("asthma", "copd", "condition").await;
        assert!(failed.error);
        assert!(!failed.matched);
        assert_eq!(failed.confidence, 0.0);
        assert_eq!(client.cache_stats().size, 0);

        let retried = client.semantic_match("asthma", "copd", "condition").await;
        assert!(!retried.error);
        assert!(!retried.from_cache);
        assert!(retried.matched);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_api_error_reasoning() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::Api {
            status: 401,
            message: "invalid x-api-key".to_string(),
        });
        let client = client_with(&mock);

        let result = client.semantic_match("asthma", "copd", "condition").await;
        assert!(result.error);
        assert_eq!(result.reasoning, "API error: invalid x-api-key");
        assert_eq!(client.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_unparseable_response() {
        let mock = Arc::new(MockLlmClient::with_response("I think they match."));
        let client = client_with(&mock);

        let result = client.semantic_match("asthma", "copd", "condition").await;
        assert!(result.error);
        assert!(!result.matched);
        assert_eq!(client.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_response_with_surrounding_prose() {
        let mock = Arc::new(MockLlmClient::with_response(format!(
            "Here is my answer:\n{}\nHope this helps.",
            verdict_json(true, 0.85)
        )));
        let client = client_with(&mock);

        let result = client.semantic_match("heart attack", "myocardial infarction", "condition").await;
        assert!(!result.error);
        assert!(result.matched);
        assert_eq!(result.confidence, 0.85);
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let mock = Arc::new(MockLlmClient::new());
        // First query answers slowest
        mock.push_delayed_response(verdict_json(true, 0.1), Duration::from_millis(60));
        mock.push_delayed_response(verdict_json(true, 0.2), Duration::from_millis(30));
        mock.push_response(verdict_json(true, 0.3));
        let client = client_with(&mock);

        let queries = vec![
            SemanticQuery::new("a", "x"),
            SemanticQuery::new("b", "y"),
            SemanticQuery::new("c", "z"),
        ];
        let results = client.batch_semantic_match(&queries).await;

        let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
        assert_eq!(confidences, vec![0.1, 0.2, 0.3]);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_batch_runs_concurrently() {
        let mock = Arc::new(MockLlmClient::new());
        for _ in 0..5 {
            mock.push_delayed_response(verdict_json(true, 0.9), Duration::from_millis(100));
        }
        let client = client_with(&mock);

        let queries: Vec<SemanticQuery> = (0..5)
            .map(|i| SemanticQuery::new(format!("term {}", i), "target"))
            .collect();

        let start = Instant::now();
        let results = client.batch_semantic_match(&queries).await;
        assert_eq!(results.len(), 5);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_set_model_keeps_cache() {
        let mock = Arc::new(MockLlmClient::with_response(verdict_json(true, 0.9)));
        let client = client_with(&mock);

        client.semantic_match("asthma", "copd", "condition").await;
        client.set_model("claude-3-5-sonnet");
        assert_eq!(client.model(), "claude-3-5-sonnet");
        assert_eq!(client.cache_stats().size, 1);

        client.semantic_match("asthma", "diabetes", "condition").await;
        assert_eq!(
            mock.requested_models(),
            vec!["mock-model".to_string(), "claude-3-5-sonnet".to_string()]
        );
    }

    #[tokio::test]
    async fn test_persisted_cache_round_trip() {
        let store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::in_memory().unwrap());
        let mock = Arc::new(MockLlmClient::with_response(verdict_json(true, 0.9)));

        let first = SemanticMatchClient::with_oracle(
            mock.clone(),
            SemanticOptions::persisted(store.clone()),
        );
        first.semantic_match("asthma", "reactive airway", "condition").await;

        let second =
            SemanticMatchClient::with_oracle(mock.clone(), SemanticOptions::persisted(store));
        assert_eq!(second.cache_stats().size, 1);
        let cached = second.semantic_match("asthma", "reactive airway", "condition").await;
        assert!(cached.from_cache);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_store_ignored_without_persist_flag() {
        let store: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::in_memory().unwrap());
        let mock = Arc::new(MockLlmClient::with_response(verdict_json(true, 0.9)));
        let options = SemanticOptions {
            persist_to_storage: false,
            store: Some(store.clone()),
            max_tokens: None,
        };

        let client = SemanticMatchClient::with_oracle(mock, options);
        client.semantic_match("asthma", "copd", "condition").await;
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_parse_verdict_missing_fields() {
        assert!(parse_verdict(r#"{"confidence": 0.5}"#).is_err());
        assert!(parse_verdict(r#"{"match": "yes", "confidence": 0.5}"#).is_err());
        let verdict = parse_verdict(r#"{"match": false, "confidence": 0.4}"#).unwrap();
        assert!(!verdict.matched);
        assert_eq!(verdict.reasoning, "");
    }
}
