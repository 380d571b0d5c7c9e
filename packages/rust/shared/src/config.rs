//! Application configuration for the catalog enricher.
//!
//! User config lives at `~/.enricher/enricher.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EnricherError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "enricher.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".enricher";

// ---------------------------------------------------------------------------
// Config structs (matching enricher.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Retry and backoff policy for generation calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Ordered model rotation list.
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Sent as `HTTP-Referer` for attribution.
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Sent as `X-Title` for attribution.
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            models: default_models(),
            referer: default_referer(),
            title: default_title(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_models() -> Vec<String> {
    vec![
        "tngtech/tng-r1t-chimera:free".into(),
        "openrouter/bert-nebulon-alpha".into(),
        "x-ai/grok-4.1-fast:free".into(),
        "openai/gpt-oss-20b:free".into(),
    ]
}
fn default_referer() -> String {
    "https://jocril.com".into()
}
fn default_title() -> String {
    "Jocril Product Enrichment".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_request_timeout() -> u64 {
    120
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per logical generation call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base wait after HTTP 429, multiplied by the attempt number.
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_secs: u64,

    /// Wait after a request timeout.
    #[serde(default = "default_timeout_delay")]
    pub timeout_delay_secs: u64,

    /// Wait after any other transport or HTTP error.
    #[serde(default = "default_error_delay")]
    pub error_delay_secs: u64,

    /// Wait after an undecodable response.
    #[serde(default = "default_decode_delay")]
    pub decode_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            rate_limit_backoff_secs: default_rate_limit_backoff(),
            timeout_delay_secs: default_timeout_delay(),
            error_delay_secs: default_error_delay(),
            decode_delay_secs: default_decode_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_rate_limit_backoff() -> u64 {
    60
}
fn default_timeout_delay() -> u64 {
    10
}
fn default_error_delay() -> u64 {
    10
}
fn default_decode_delay() -> u64 {
    5
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Catalog JSON to enrich.
    #[serde(default = "default_input")]
    pub input: String,

    /// Where the enriched catalog is written.
    #[serde(default = "default_output")]
    pub output: String,

    /// Checkpoint snapshot path.
    #[serde(default = "default_checkpoint")]
    pub checkpoint: String,

    /// Flush the checkpoint after this many newly processed products.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Pause after every product, in seconds.
    #[serde(default = "default_item_delay")]
    pub item_delay_secs: u64,

    /// Category name used when a product's `category_id` is unknown.
    #[serde(default = "default_category")]
    pub default_category: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            checkpoint: default_checkpoint(),
            checkpoint_interval: default_checkpoint_interval(),
            item_delay_secs: default_item_delay(),
            default_category: default_category(),
        }
    }
}

fn default_input() -> String {
    "products.json".into()
}
fn default_output() -> String {
    "products_enriched.json".into()
}
fn default_checkpoint() -> String {
    "checkpoint.json".into()
}
fn default_checkpoint_interval() -> usize {
    10
}
fn default_item_delay() -> u64 {
    5
}
fn default_category() -> String {
    "Acrílicos".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime generation client configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Full chat-completions endpoint.
    pub endpoint: Url,
    /// Ordered model rotation list (never empty).
    pub models: Vec<String>,
    pub referer: String,
    pub title: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    /// Attempts per logical call (at least 1).
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub timeout_delay: Duration,
    pub error_delay: Duration,
    pub decode_delay: Duration,
}

impl TryFrom<&AppConfig> for GenerationConfig {
    type Error = EnricherError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let or = &config.openrouter;
        let retry = &config.retry;

        if or.models.is_empty() {
            return Err(EnricherError::config(
                "[openrouter].models must list at least one model",
            ));
        }
        if retry.max_attempts == 0 {
            return Err(EnricherError::config("[retry].max_attempts must be at least 1"));
        }

        let raw = format!("{}/chat/completions", or.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&raw).map_err(|e| {
            EnricherError::config(format!("invalid [openrouter].base_url '{}': {e}", or.base_url))
        })?;

        Ok(Self {
            endpoint,
            models: or.models.clone(),
            referer: or.referer.clone(),
            title: or.title.clone(),
            temperature: or.temperature,
            max_tokens: or.max_tokens,
            request_timeout: Duration::from_secs(or.request_timeout_secs),
            max_attempts: retry.max_attempts,
            rate_limit_backoff: Duration::from_secs(retry.rate_limit_backoff_secs),
            timeout_delay: Duration::from_secs(retry.timeout_delay_secs),
            error_delay: Duration::from_secs(retry.error_delay_secs),
            decode_delay: Duration::from_secs(retry.decode_delay_secs),
        })
    }
}

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub checkpoint: PathBuf,
    /// Flush cadence (at least 1).
    pub checkpoint_interval: usize,
    pub item_delay: Duration,
    pub default_category: String,
}

impl TryFrom<&AppConfig> for PipelineConfig {
    type Error = EnricherError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let p = &config.pipeline;
        if p.checkpoint_interval == 0 {
            return Err(EnricherError::config(
                "[pipeline].checkpoint_interval must be at least 1",
            ));
        }

        Ok(Self {
            input: PathBuf::from(&p.input),
            output: PathBuf::from(&p.output),
            checkpoint: PathBuf::from(&p.checkpoint),
            checkpoint_interval: p.checkpoint_interval,
            item_delay: Duration::from_secs(p.item_delay_secs),
            default_category: p.default_category.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.enricher/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnricherError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.enricher/enricher.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnricherError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        EnricherError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnricherError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnricherError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnricherError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from its env var.
///
/// A missing or empty key is fatal: callers must check this before any
/// product is processed.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(EnricherError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
