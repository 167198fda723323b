//! Configuration management for myaei
//!
//! Parses TOML configuration files, applies environment overrides, and
//! provides typed access to settings.

use crate::analysis::SchemaVersion;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Environment variable holding the LLM provider credential
pub const ENV_API_KEY: &str = "GROQ_API_KEY";
/// Environment variable holding the MongoDB connection string
pub const ENV_MONGO_URL: &str = "MONGO_URL";
/// Environment variable holding the MongoDB database name
pub const ENV_DB_NAME: &str = "DB_NAME";
/// Environment variable overriding the model name
pub const ENV_MODEL: &str = "MYAEI_MODEL";
/// Environment variable overriding the maximum retry count
pub const ENV_MAX_RETRIES: &str = "MYAEI_MAX_RETRIES";

/// Upper bound for any timeout, in seconds
const MAX_TIMEOUT_SECONDS: u64 = 300;
/// Upper bound for the retry count
const MAX_RETRIES_LIMIT: usize = 10;
/// Upper bound for the base backoff, in milliseconds
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Provider credential
///
/// Never printed: `Debug` and `Display` are redacted and the value is not
/// serialized back out.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the raw credential for the Authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// LLM provider configuration
///
/// Fields are private so validated values can't be mutated after
/// `Config::validate()`; environment overrides go through
/// `Config::apply_overrides_from()`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,
    #[serde(default = "default_top_p")]
    top_p: f64,
    #[serde(default = "default_max_retries")]
    max_retries: usize,
    /// Base backoff; connection/server errors wait `base * 2^attempt`
    #[serde(default = "default_retry_backoff_ms")]
    retry_backoff_ms: u64,
    #[serde(default = "default_llm_timeout")]
    request_timeout_seconds: u64,
    #[serde(default, skip_serializing)]
    api_key: Option<ApiKey>,
}

impl LlmConfig {
    /// Get the provider base URL (OpenAI-compatible, e.g. `.../openai/v1`)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the sampling temperature
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Get the completion token budget
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Get the nucleus sampling parameter
    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    /// Get the total number of provider attempts per analysis
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Get the base backoff in milliseconds
    pub fn retry_backoff_ms(&self) -> u64 {
        self.retry_backoff_ms
    }

    /// Get the transport timeout for a single provider call
    pub fn request_timeout_seconds(&self) -> u64 {
        self.request_timeout_seconds
    }

    /// Get the provider credential, if one is configured
    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_seconds: default_llm_timeout(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> usize {
    1500
}

fn default_top_p() -> f64 {
    1.0
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_llm_timeout() -> u64 {
    30
}

/// What the pipeline does once every provider attempt has failed
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Return the "analysis unavailable" result with HTTP 200
    #[default]
    Fallback,
    /// Return 503 (provider unavailable) or 500 (unexpected failures)
    Fail,
}

/// Analysis pipeline configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub schema: SchemaVersion,
    #[serde(default)]
    pub on_exhaustion: ExhaustionPolicy,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Mongodb,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_mongo_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: default_mongo_url(),
            database: default_database(),
        }
    }
}

fn default_mongo_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "myaei".to_string()
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Environment overrides are NOT applied here; call `apply_env_overrides()`
    /// afterwards (main does).
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> AppResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production)
    ///
    /// Empty values are ignored. The result is re-validated.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.llm.api_key = Some(ApiKey::new(key.trim()));
        }
        if let Some(model) = get(ENV_MODEL) {
            tracing::debug!(model = %model, "Model overridden from environment");
            self.llm.model = model;
        }
        if let Some(raw) = get(ENV_MAX_RETRIES) {
            self.llm.max_retries = raw.trim().parse().map_err(|_| {
                AppError::Config(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_MAX_RETRIES, raw
                ))
            })?;
        }
        if let Some(url) = get(ENV_MONGO_URL) {
            self.storage.url = url;
        }
        if let Some(db) = get(ENV_DB_NAME) {
            self.storage.database = db;
        }

        self.validate()
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and after overrides, but
    /// can also be called explicitly (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        // LLM provider
        let llm = &self.llm;
        if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "llm.base_url '{}' must start with 'http://' or 'https://'",
                llm.base_url
            )));
        }
        if llm.model.trim().is_empty() {
            return Err(AppError::Config("llm.model cannot be empty".to_string()));
        }
        if !llm.temperature.is_finite() || !(0.0..=2.0).contains(&llm.temperature) {
            return Err(AppError::Config(format!(
                "llm.temperature must be a finite number between 0.0 and 2.0, got {}",
                llm.temperature
            )));
        }
        if !llm.top_p.is_finite() || llm.top_p <= 0.0 || llm.top_p > 1.0 {
            return Err(AppError::Config(format!(
                "llm.top_p must be in (0.0, 1.0], got {}",
                llm.top_p
            )));
        }
        if llm.max_tokens == 0 {
            return Err(AppError::Config(
                "llm.max_tokens must be greater than 0".to_string(),
            ));
        }
        // Provider APIs take max_tokens as a 32-bit integer
        if llm.max_tokens > u32::MAX as usize {
            return Err(AppError::Config(format!(
                "llm.max_tokens={} exceeds u32::MAX ({})",
                llm.max_tokens,
                u32::MAX
            )));
        }
        if llm.max_retries == 0 || llm.max_retries > MAX_RETRIES_LIMIT {
            return Err(AppError::Config(format!(
                "llm.max_retries must be between 1 and {}, got {}",
                MAX_RETRIES_LIMIT, llm.max_retries
            )));
        }
        if llm.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(AppError::Config(format!(
                "llm.retry_backoff_ms cannot exceed {} ms, got {}",
                MAX_RETRY_BACKOFF_MS, llm.retry_backoff_ms
            )));
        }
        if llm.request_timeout_seconds == 0 || llm.request_timeout_seconds > MAX_TIMEOUT_SECONDS
        {
            return Err(AppError::Config(format!(
                "llm.request_timeout_seconds must be between 1 and {}, got {}",
                MAX_TIMEOUT_SECONDS, llm.request_timeout_seconds
            )));
        }

        // Storage
        if self.storage.backend == StorageBackend::Mongodb {
            if !cfg!(feature = "mongodb") {
                return Err(AppError::Config(
                    "storage.backend = \"mongodb\" requires building with the `mongodb` feature"
                        .to_string(),
                ));
            }
            if !self.storage.url.starts_with("mongodb://")
                && !self.storage.url.starts_with("mongodb+srv://")
            {
                return Err(AppError::Config(format!(
                    "storage.url '{}' must start with 'mongodb://' or 'mongodb+srv://'",
                    self.storage.url
                )));
            }
            if self.storage.database.trim().is_empty() {
                return Err(AppError::Config(
                    "storage.database cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 8001

[llm]
base_url = "https://api.groq.com/openai/v1"
model = "llama-3.1-8b-instant"
temperature = 0.3
max_tokens = 1500
top_p = 1.0
max_retries = 3
retry_backoff_ms = 1000

[analysis]
schema = "enhanced"
on_exhaustion = "fallback"

[observability]
log_level = "debug"
"#;

    const MINIMAL_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 3000
"#;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.llm.model(), "llama-3.1-8b-instant");
        assert_eq!(config.llm.max_retries(), 3);
        assert_eq!(config.analysis.schema, SchemaVersion::Enhanced);
        assert_eq!(config.analysis.on_exhaustion, ExhaustionPolicy::Fallback);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_str(MINIMAL_CONFIG).expect("should parse config");
        assert_eq!(config.llm.base_url(), "https://api.groq.com/openai/v1");
        assert_eq!(config.llm.max_retries(), 3);
        assert_eq!(config.llm.retry_backoff_ms(), 1000);
        assert!(config.llm.api_key().is_none());
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_exhaustion_policy_parses_fail() {
        let toml = format!("{}\n[analysis]\non_exhaustion = \"fail\"\n", MINIMAL_CONFIG);
        let config = Config::from_str(&toml).expect("should parse config");
        assert_eq!(config.analysis.on_exhaustion, ExhaustionPolicy::Fail);
    }

    #[test]
    fn test_unknown_exhaustion_policy_rejected() {
        let toml = format!("{}\n[analysis]\non_exhaustion = \"panic\"\n", MINIMAL_CONFIG);
        assert!(matches!(
            Config::from_str(&toml),
            Err(AppError::ConfigParseFailed { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_retries() {
        let toml = format!("{}\n[llm]\nmax_retries = 0\n", MINIMAL_CONFIG);
        let err = Config::from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_validation_rejects_temperature_out_of_range() {
        let toml = format!("{}\n[llm]\ntemperature = 2.5\n", MINIMAL_CONFIG);
        let err = Config::from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_validation_rejects_zero_top_p() {
        let toml = format!("{}\n[llm]\ntop_p = 0.0\n", MINIMAL_CONFIG);
        let err = Config::from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("top_p"));
    }

    #[test]
    fn test_validation_rejects_base_url_without_scheme() {
        let toml = format!("{}\n[llm]\nbase_url = \"api.groq.com\"\n", MINIMAL_CONFIG);
        let err = Config::from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_validation_rejects_excessive_backoff() {
        let toml = format!("{}\n[llm]\nretry_backoff_ms = 120000\n", MINIMAL_CONFIG);
        assert!(Config::from_str(&toml).is_err());
    }

    #[cfg(not(feature = "mongodb"))]
    #[test]
    fn test_mongodb_backend_requires_feature() {
        let toml = format!("{}\n[storage]\nbackend = \"mongodb\"\n", MINIMAL_CONFIG);
        let err = Config::from_str(&toml).unwrap_err();
        assert!(err.to_string().contains("mongodb"));
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = Config::from_str(MINIMAL_CONFIG).unwrap();
        config
            .apply_overrides_from(lookup(&[
                (ENV_API_KEY, "gsk_test"),
                (ENV_MODEL, "mixtral-8x7b-32768"),
                (ENV_MAX_RETRIES, "5"),
                (ENV_MONGO_URL, "mongodb://db:27017"),
                (ENV_DB_NAME, "test_database"),
            ]))
            .expect("overrides should apply");

        assert_eq!(config.llm.api_key().unwrap().expose(), "gsk_test");
        assert_eq!(config.llm.model(), "mixtral-8x7b-32768");
        assert_eq!(config.llm.max_retries(), 5);
        assert_eq!(config.storage.url, "mongodb://db:27017");
        assert_eq!(config.storage.database, "test_database");
    }

    #[test]
    fn test_env_overrides_ignore_empty_values() {
        let mut config = Config::from_str(MINIMAL_CONFIG).unwrap();
        config
            .apply_overrides_from(lookup(&[(ENV_API_KEY, "   "), (ENV_MODEL, "")]))
            .unwrap();
        assert!(config.llm.api_key().is_none());
        assert_eq!(config.llm.model(), "llama-3.1-8b-instant");
    }

    #[test]
    fn test_env_override_invalid_retries_rejected() {
        let mut config = Config::from_str(MINIMAL_CONFIG).unwrap();
        let err = config
            .apply_overrides_from(lookup(&[(ENV_MAX_RETRIES, "three")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_RETRIES));
    }

    #[test]
    fn test_env_override_out_of_range_retries_rejected() {
        let mut config = Config::from_str(MINIMAL_CONFIG).unwrap();
        assert!(
            config
                .apply_overrides_from(lookup(&[(ENV_MAX_RETRIES, "50")]))
                .is_err()
        );
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let mut config = Config::from_str(MINIMAL_CONFIG).unwrap();
        config
            .apply_overrides_from(lookup(&[(ENV_API_KEY, "gsk_secret")]))
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("gsk_secret"));
        assert!(debug.contains("ApiKey(***)"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::from_str(MINIMAL_CONFIG).unwrap();
        config
            .apply_overrides_from(lookup(&[(ENV_API_KEY, "gsk_secret")]))
            .unwrap();
        let rendered = toml::to_string(&config).expect("config should serialize");
        assert!(!rendered.contains("gsk_secret"));
    }
}
