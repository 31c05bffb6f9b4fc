use std::path::Path;

use crate::config::schema::{Config, ExecutorConfig};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    validate_executor("text_extractor", &config.text_extractor)?;
    validate_executor("question_extractor", &config.question_extractor)?;

    let ratio = config.chunking.scale_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(ConfigError::Validation {
            message: format!("chunking.scale_ratio must be in (0, 1], got {}", ratio),
        });
    }
    if config.chunking.base_size == 0 {
        return Err(ConfigError::Validation {
            message: "chunking.base_size must be positive".to_string(),
        });
    }

    if config.chunk_concurrency == 0 || config.max_concurrent_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "chunk_concurrency and max_concurrent_jobs must be positive".to_string(),
        });
    }

    Ok(())
}

fn validate_executor(name: &str, executor: &ExecutorConfig) -> Result<(), ConfigError> {
    if executor.program.trim().is_empty() {
        return Err(ConfigError::InvalidExecutor {
            name: name.to_string(),
            reason: "program must not be empty".to_string(),
        });
    }
    if executor.timeout_secs == 0 {
        return Err(ConfigError::InvalidExecutor {
            name: name.to_string(),
            reason: "timeout_secs must be positive".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
    {
        "version": "1.0",
        "storage_directory": "/var/lib/quizforge/objects",
        "text_extractor": { "program": "python", "args": ["scripts/main.py"] },
        "question_extractor": { "program": "node", "args": ["scripts/extractQuestions.js"] }
    }
    "#;

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.chunking.chunk_size(), 5360);
        assert_eq!(config.chunk_concurrency, 1);
        assert!(config.max_concurrent_jobs >= 1);
        assert_eq!(config.text_extractor.args, vec!["scripts/main.py"]);
        assert_eq!(config.question_extractor.timeout_secs, 300);
        assert_eq!(config.upload.max_file_size, 52_428_800);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/tmp/q.db",
            "storage_directory": "/tmp/objects",
            "work_directory": "/tmp/work",
            "text_extractor": {
                "program": "python",
                "args": ["main.py"],
                "env": { "PYTHONIOENCODING": "utf-8" },
                "timeout_secs": 120
            },
            "question_extractor": { "program": "node", "timeout_secs": 600 },
            "chunking": { "base_size": 4000, "scale_ratio": 0.5 },
            "chunk_concurrency": 3,
            "max_concurrent_jobs": 2,
            "upload": { "max_file_size": 1024 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.chunking.chunk_size(), 2000);
        assert_eq!(config.chunk_concurrency, 3);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(
            config.text_extractor.env.get("PYTHONIOENCODING").map(String::as_str),
            Some("utf-8")
        );
        assert_eq!(config.text_extractor.timeout_secs, 120);
        assert_eq!(config.upload.max_file_size, 1024);
    }

    #[test]
    fn test_missing_extractor_fails_schema() {
        let config_json = r#"
        {
            "version": "1.0",
            "storage_directory": "/tmp/objects",
            "text_extractor": { "program": "python" }
        }
        "#;

        let result = load_config_from_str(config_json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_field_fails_schema() {
        let config_json = MINIMAL.replace("\"version\": \"1.0\",", "\"version\": \"1.0\", \"bogus\": 1,");
        let result = load_config_from_str(&config_json);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let config_json = MINIMAL.replace("\"1.0\"", "\"2.0\"");
        assert!(load_config_from_str(&config_json).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = load_config_from_str(MINIMAL).unwrap();
        config.text_extractor.timeout_secs = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::InvalidExecutor { .. })));
    }

    #[test]
    fn test_blank_program_rejected() {
        let mut config = load_config_from_str(MINIMAL).unwrap();
        config.question_extractor.program = "   ".to_string();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::InvalidExecutor { name, .. }) if name == "question_extractor"));
    }

    #[test]
    fn test_invalid_json_error() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/quizforge.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
