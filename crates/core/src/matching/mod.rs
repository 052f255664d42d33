//! Matching - deciding whether patient terms satisfy criterion terms.
//!
//! Two layers, cheapest first:
//!
//! ```text
//! patient terms ──► overlap (exact / fuzzy / synonyms) ──► hit? ──► match
//!                                   │
//!                                   └─ inconclusive ──► SemanticMatchClient
//!                                                        │  cache hit ─► verdict
//!                                                        └─ miss ─► LlmClient (oracle)
//! ```
//!
//! The oracle sits behind the narrow [`LlmClient`] trait so tests can swap in
//! [`crate::testing::MockLlmClient`].

mod cache_store;
mod llm;
mod overlap;
mod semantic;
mod types;

// Oracle client types
pub use llm::{
    AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage,
};

// Lexical overlap
pub use overlap::{
    overlaps, overlaps_by, overlaps_with_synonyms, terms_match, SynonymTable, Terms,
    MIN_SHARED_WORD_LEN,
};

// Semantic client
pub use semantic::{
    oracle_from_config, SemanticError, SemanticMatchClient, SemanticOptions, DEFAULT_MODEL,
};

// Cache persistence
pub use cache_store::{CacheStore, CacheStoreError, SqliteCacheStore};

pub use types::{
    CacheKey, CacheStats, CachedVerdict, SemanticMatch, SemanticQuery, DEFAULT_MATCH_TYPE,
};
