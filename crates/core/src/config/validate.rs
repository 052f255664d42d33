use super::{types::Config, ConfigError};

/// Reject configurations the server cannot run with.
///
/// All problems are reported at once, joined with `"; "`.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    if config.server.port == 0 {
        problems.push("server.port must be non-zero".to_string());
    }

    let miss = config.matching.lexical_miss_confidence;
    if !(0.0..=1.0).contains(&miss) {
        problems.push(format!(
            "matching.lexical_miss_confidence must lie in [0, 1], got {}",
            miss
        ));
    }

    if config.matching.batch_size == 0 {
        problems.push("matching.batch_size must be at least 1".to_string());
    }

    if let Some(llm) = &config.llm {
        if llm.model.trim().is_empty() {
            problems.push("llm.model must name a model".to_string());
        }
        if llm.timeout_secs == 0 {
            problems.push("llm.timeout_secs must be at least 1".to_string());
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(problems.join("; ")))
    }
}
