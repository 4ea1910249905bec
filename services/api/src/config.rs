use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tutor_core::llm_client::RetryPolicy;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Cross-origin callers allowed to reach the API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub api_base: String,
    pub chat_model: String,
    pub course_topic: String,
    pub api_prefix: String,
    pub cors_origins: CorsOrigins,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub model_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1/".to_string());

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let course_topic =
            std::env::var("COURSE_TOPIC").unwrap_or_else(|_| "Python Programming".to_string());

        let api_prefix = std::env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".to_string());
        let api_prefix = api_prefix.trim_end_matches('/').to_string();
        if !api_prefix.starts_with('/') || api_prefix.len() < 2 {
            return Err(ConfigError::InvalidValue(
                "API_PREFIX".to_string(),
                "must be a path like '/api/v1'".to_string(),
            ));
        }

        let cors_str = std::env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());
        let cors_origins = if cors_str.trim() == "*" {
            CorsOrigins::Any
        } else {
            let origins: Vec<String> = cors_str
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
            if origins.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "CORS_ALLOW_ORIGINS".to_string(),
                    "expected '*' or a comma-separated origin list".to_string(),
                ));
            }
            CorsOrigins::List(origins)
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        let model_timeout = match std::env::var("MODEL_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.parse::<u64>().ok().filter(|secs| *secs > 0).ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "MODEL_TIMEOUT_SECS".to_string(),
                        format!("'{}' is not a positive number of seconds", raw),
                    )
                })?;
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        let retry = load_retry_policy()?;

        Ok(Self {
            bind_address,
            openai_api_key,
            api_base,
            chat_model,
            course_topic,
            api_prefix,
            cors_origins,
            log_level,
            prompts_path,
            model_timeout,
            retry,
        })
    }
}

/// Reads the retry knobs, falling back to the no-retry default policy.
fn load_retry_policy() -> Result<RetryPolicy, ConfigError> {
    let defaults = RetryPolicy::default();

    let max_attempts = match std::env::var("RETRY_MAX_ATTEMPTS") {
        Ok(raw) => raw.parse::<u32>().ok().filter(|n| *n >= 1).ok_or_else(|| {
            ConfigError::InvalidValue(
                "RETRY_MAX_ATTEMPTS".to_string(),
                format!("'{}' is not a positive attempt count", raw),
            )
        })?,
        Err(_) => defaults.max_attempts,
    };

    let initial_interval = match std::env::var("RETRY_INITIAL_INTERVAL_MS") {
        Ok(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
            ConfigError::InvalidValue(
                "RETRY_INITIAL_INTERVAL_MS".to_string(),
                format!("'{}' is not a number of milliseconds", raw),
            )
        })?,
        Err(_) => defaults.initial_interval,
    };

    let backoff_factor = match std::env::var("RETRY_BACKOFF_FACTOR") {
        Ok(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|factor| *factor >= 1.0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "RETRY_BACKOFF_FACTOR".to_string(),
                    format!("'{}' is not a factor >= 1.0", raw),
                )
            })?,
        Err(_) => defaults.backoff_factor,
    };

    let max_interval = match std::env::var("RETRY_MAX_INTERVAL_MS") {
        Ok(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
            ConfigError::InvalidValue(
                "RETRY_MAX_INTERVAL_MS".to_string(),
                format!("'{}' is not a number of milliseconds", raw),
            )
        })?,
        Err(_) => defaults.max_interval,
    };

    Ok(RetryPolicy {
        max_attempts,
        initial_interval,
        backoff_factor,
        max_interval,
    })
}
