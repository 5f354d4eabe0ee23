use crate::config::Config;
use crate::error::{BugbusterError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_conversation(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_compose(config, &mut errors);
        Self::validate_server(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BugbusterError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
        if config.storage.database_file.trim().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_file",
                "Database file name cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if provider != "fastembed" && provider != "hashing" {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be 'fastembed' or 'hashing', got '{}'",
                    provider
                ),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        let threshold = config.retrieval.min_similarity;
        if !(-1.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "retrieval.min_similarity",
                format!("Similarity threshold must be within [-1, 1], got {}", threshold),
            ));
        }

        if config.retrieval.list_limit == Some(0) {
            errors.push(ValidationError::new(
                "retrieval.list_limit",
                "List limit must be greater than 0 when set",
            ));
        }
    }

    fn validate_conversation(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.conversation.max_turns == 0 {
            errors.push(ValidationError::new(
                "conversation.max_turns",
                "Conversation window must be greater than 0",
            ));
        }
        if config.conversation.history_in_prompt > config.conversation.max_turns {
            errors.push(ValidationError::new(
                "conversation.history_in_prompt",
                "Prompt history cannot exceed the conversation window",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        // The API key only matters when a remote model is used
        if config.llm.enabled {
            let env_var = &config.llm.api_key_env;
            match std::env::var(env_var) {
                Ok(key) if key.is_empty() => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is empty", env_var),
                )),
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is not set", env_var),
                )),
            }

            if !config.llm.base_url.starts_with("http://")
                && !config.llm.base_url.starts_with("https://")
            {
                errors.push(ValidationError::new(
                    "llm.base_url",
                    format!("Base URL must be http(s), got '{}'", config.llm.base_url),
                ));
            }
        }

        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if config.llm.max_tokens == 0 {
            errors.push(ValidationError::new(
                "llm.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        if config.llm.max_retries > 1 {
            errors.push(ValidationError::new(
                "llm.max_retries",
                format!(
                    "A failed generation is retried at most once, got {}",
                    config.llm.max_retries
                ),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["openai", "groq", "ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }
    }

    fn validate_compose(config: &Config, errors: &mut Vec<ValidationError>) {
        let fallback = config.compose.fallback_relevance;
        if !(0.0..=1.0).contains(&fallback) {
            errors.push(ValidationError::new(
                "compose.fallback_relevance",
                format!("Fallback relevance must be within [0, 1], got {}", fallback),
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "server.bind",
                format!("Invalid bind address: {}", config.server.bind),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "invalid".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        config.compose.fallback_relevance = 1.5;
        config.server.bind = "nowhere".to_string();

        match ConfigValidator::validate(&config) {
            Err(BugbusterError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(
                    paths,
                    vec!["retrieval.top_k", "compose.fallback_relevance", "server.bind"]
                );
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_history_cannot_exceed_window() {
        let mut config = Config::default();
        config.conversation.max_turns = 2;
        config.conversation.history_in_prompt = 3;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_generation_retried_at_most_once() {
        let mut config = Config::default();
        config.llm.max_retries = 0;
        assert!(ConfigValidator::validate(&config).is_ok());

        config.llm.max_retries = 3;
        match ConfigValidator::validate(&config) {
            Err(BugbusterError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "llm.max_retries");
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }
}
