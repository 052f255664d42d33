use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Everything `trialmatch` reads from `config.toml`.
///
/// Every section may be omitted; missing keys take the values from the
/// section's `Default` impl.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    /// Oracle settings. `None` means no `[llm]` table was given.
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Origin allowed by CORS (the local questionnaire frontend).
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3001,
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

/// SQLite file shared by the term review queue and the semantic verdict cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("trialmatch.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Use substring and word-overlap heuristics on top of exact equality.
    pub fuzzy: bool,
    /// Fall back to the semantic oracle when lexical comparison is inconclusive.
    pub semantic_enabled: bool,
    /// Confidence assigned to a non-match decided without the oracle.
    pub lexical_miss_confidence: f64,
    /// Maximum oracle queries issued concurrently for one criterion.
    pub batch_size: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy: true,
            semantic_enabled: true,
            lexical_miss_confidence: 0.8,
            batch_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    /// Alternate endpoint, e.g. a proxy in front of the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub timeout_secs: u32,
    pub max_tokens: u32,
    /// Keep semantic verdicts in the database across restarts.
    pub persist_to_storage: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: crate::matching::DEFAULT_MODEL.to_string(),
            api_base: None,
            timeout_secs: 30,
            max_tokens: 256,
            persist_to_storage: false,
        }
    }
}

impl LlmConfig {
    /// A non-blank key is present.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// The view of [`Config`] served by `GET /api/config`.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<SanitizedLlmConfig>,
}

/// Oracle settings with the key reduced to a flag.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLlmConfig {
    pub model: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
    pub persist_to_storage: bool,
}

impl From<&LlmConfig> for SanitizedLlmConfig {
    fn from(llm: &LlmConfig) -> Self {
        Self {
            model: llm.model.clone(),
            api_key_configured: llm.has_api_key(),
            timeout_secs: llm.timeout_secs,
            persist_to_storage: llm.persist_to_storage,
        }
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            matching: config.matching.clone(),
            llm: config.llm.as_ref().map(SanitizedLlmConfig::from),
        }
    }
}
