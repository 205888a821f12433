//! Configuration loading and representation.
//!
//! Values come from environment variables; `from_lookup` takes any key lookup
//! so tests can supply values without touching the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use critique_ai::OpenAiConfig;

use crate::analysis::RetryPolicy;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0}")]
    Validation(String),
}

/// Orchestration settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Maximum simultaneous outbound generation calls
    pub max_concurrency: usize,
    /// Per-call timeout
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    /// How long a finished, unretrieved job is kept
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            call_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_concurrency: parse_or(&lookup, "ANALYSIS_MAX_CONCURRENCY", defaults.max_concurrency)?,
            call_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ANALYSIS_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "ANALYSIS_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                base_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "ANALYSIS_BACKOFF_BASE_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )?),
                max_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "ANALYSIS_BACKOFF_MAX_MS",
                    defaults.retry.max_delay.as_millis() as u64,
                )?),
                ..defaults.retry
            },
            retention: Duration::from_secs(parse_or(
                &lookup,
                "ANALYSIS_RETENTION_SECS",
                defaults.retention.as_secs(),
            )?),
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "ANALYSIS_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Validation("max_concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation("max_attempts must be at least 1".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Validation("call_timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Process configuration for the HTTP service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub personas_file: PathBuf,
    pub analysis: AnalysisConfig,
    pub openai: OpenAiConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let analysis = AnalysisConfig::from_lookup(&lookup)?;

        let defaults = OpenAiConfig::default();
        let openai = OpenAiConfig {
            api_key: lookup("OPENAI_API_KEY").unwrap_or_default(),
            model: lookup("OPENAI_MODEL").unwrap_or(defaults.model),
            base_url: lookup("OPENAI_BASE_URL").or(defaults.base_url),
            temperature: parse_or(&lookup, "OPENAI_TEMPERATURE", defaults.temperature)?,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            personas_file: lookup("PERSONAS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("personas.yaml")),
            analysis,
            openai,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
