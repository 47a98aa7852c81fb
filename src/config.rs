use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_DOCUMENTS_DIR: &str = "uploads";
const DEFAULT_DATABASE_PATH: &str = "data/analysis.db";
pub(crate) const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_RETRIES: u32 = 2;
pub(crate) const DEFAULT_CHUNK_MAX_CHARS: usize = 5000;
pub(crate) const DEFAULT_SAMPLE_COUNT: usize = 20;
pub(crate) const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;
pub(crate) const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty Reader server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding cached document text files (`<id>.txt`).
    pub documents_dir: PathBuf,
    /// SQLite file backing the analysis job store.
    pub database_path: PathBuf,
    /// Summarization backend reached for both pipeline stages.
    pub llm_provider: LlmProvider,
    /// Model identifier passed to the provider.
    pub llm_model: String,
    /// Optional override for the provider base URL.
    pub llm_base_url: Option<String>,
    /// Bearer key for hosted providers.
    pub llm_api_key: Option<String>,
    /// Sampling temperature sent with every request.
    pub llm_temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub llm_request_timeout_secs: u64,
    /// Number of retries for transient provider failures.
    pub llm_max_retries: u32,
    /// Maximum chunk length in characters.
    pub analysis_chunk_max_chars: usize,
    /// Target number of sampled chunks per document.
    pub analysis_sample_count: usize,
    /// Optional seed making chunk sampling reproducible.
    pub analysis_sample_seed: Option<u64>,
    /// Upper bound for each pipeline stage in seconds.
    pub analysis_stage_timeout_secs: u64,
    /// Concurrent chunk requests issued during the first stage.
    pub analysis_max_concurrent_requests: usize,
    /// Number of analysis runs allowed to execute at once.
    pub analysis_max_concurrent_jobs: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported summarization backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Local Ollama runtime (`/api/chat`).
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint (OpenAI, Groq, vLLM).
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Lookup(lookup);
        let llm_provider = vars
            .required("LLM_PROVIDER")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".into()))?;
        let llm_api_key = vars.optional("LLM_API_KEY");
        if llm_provider == LlmProvider::OpenAI && llm_api_key.is_none() {
            return Err(ConfigError::MissingVariable("LLM_API_KEY".into()));
        }

        Ok(Self {
            documents_dir: vars
                .optional("DOCUMENTS_DIR")
                .unwrap_or_else(|| DEFAULT_DOCUMENTS_DIR.into())
                .into(),
            database_path: vars
                .optional("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.into())
                .into(),
            llm_provider,
            llm_model: vars.required("LLM_MODEL")?,
            llm_base_url: vars.optional("LLM_BASE_URL"),
            llm_api_key,
            llm_temperature: vars
                .parsed("LLM_TEMPERATURE")?
                .unwrap_or(DEFAULT_TEMPERATURE),
            llm_request_timeout_secs: vars
                .positive("LLM_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            llm_max_retries: vars.parsed("LLM_MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES),
            analysis_chunk_max_chars: vars
                .positive("ANALYSIS_CHUNK_MAX_CHARS")?
                .unwrap_or(DEFAULT_CHUNK_MAX_CHARS),
            analysis_sample_count: vars
                .positive("ANALYSIS_SAMPLE_COUNT")?
                .unwrap_or(DEFAULT_SAMPLE_COUNT),
            analysis_sample_seed: vars.parsed("ANALYSIS_SAMPLE_SEED")?,
            analysis_stage_timeout_secs: vars
                .positive("ANALYSIS_STAGE_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS),
            analysis_max_concurrent_requests: vars
                .positive("ANALYSIS_MAX_CONCURRENT_REQUESTS")?
                .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS),
            analysis_max_concurrent_jobs: vars
                .positive("ANALYSIS_MAX_CONCURRENT_JOBS")?
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
            server_port: vars.parsed("SERVER_PORT")?,
        })
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }

    fn positive<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + PartialEq + Default,
    {
        match self.parsed::<T>(key)? {
            Some(value) if value == T::default() => {
                Err(ConfigError::InvalidValue(key.to_string()))
            }
            other => Ok(other),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "groq" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        provider = ?config.llm_provider,
        model = %config.llm_model,
        documents_dir = %config.documents_dir.display(),
        database_path = %config.database_path.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
