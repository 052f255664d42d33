use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variables with this prefix override file values.
/// Nested keys use a double underscore: `TRIALMATCH_LLM__API_KEY`.
pub const ENV_PREFIX: &str = "TRIALMATCH_";

fn layered(path: &Path) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Read `path` as TOML, then apply `TRIALMATCH_*` overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    layered(path)
        .extract::<Config>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse TOML text without consulting the environment.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str::<Config>(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_matching_section_from_str() {
        let config = load_config_from_str(
            r#"
[matching]
semantic_enabled = false
lexical_miss_confidence = 0.6
"#,
        )
        .unwrap();
        assert!(!config.matching.semantic_enabled);
        assert_eq!(config.matching.lexical_miss_confidence, 0.6);
        assert!(config.matching.fuzzy);
    }

    #[test]
    fn test_type_mismatch_is_parse_error() {
        let result = load_config_from_str("[matching]\nbatch_size = \"lots\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_and_directory_are_not_found() {
        let missing = load_config(Path::new("/nonexistent/trialmatch.toml"));
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));

        let dir = tempfile::tempdir().unwrap();
        let as_dir = load_config(dir.path());
        assert!(matches!(as_dir, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_file_with_oracle_section() {
        let file = write_toml(
            r#"
[server]
host = "127.0.0.1"
port = 3100

[database]
path = "/tmp/trials.db"

[llm]
model = "claude-3-haiku-20240307"
timeout_secs = 5
"#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.database.path, Path::new("/tmp/trials.db"));
        let llm = config.llm.unwrap();
        assert_eq!(llm.model, "claude-3-haiku-20240307");
        assert_eq!(llm.timeout_secs, 5);
    }
}
