pub mod collections;
pub mod config;
pub mod engine;
pub mod matching;
pub mod metrics;
pub mod results;
pub mod terms;
pub mod testing;

pub use collections::{chunk, group_by, unique_by, CollectionError};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LlmConfig,
    MatchingConfig, SanitizedConfig,
};
pub use engine::{derive_status, Criterion, EligibilityEngine, PatientTerms, Trial};
pub use matching::{
    overlaps, AnthropicClient, CacheStats, CacheStore, LlmClient, SemanticError, SemanticMatch,
    SemanticMatchClient, SemanticOptions, SqliteCacheStore, SynonymTable,
};
pub use results::{
    CriterionMatchResult, ExclusionStrength, MatchSummary, PatientMatchResults,
    TrialEligibilityResult, TrialStatus,
};
pub use terms::{ApprovedTerm, SqliteTermStore, TermError, TermStore, TermType};
