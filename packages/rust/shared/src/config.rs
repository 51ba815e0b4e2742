//! Application configuration for IncidentScout.
//!
//! User config lives at `~/.incidentscout/incidentscout.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file, only env var names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IncidentScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "incidentscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".incidentscout";

// ---------------------------------------------------------------------------
// Config structs (matching incidentscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fixed paths and global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Text completion service settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// External knowledge gateway settings.
    #[serde(default)]
    pub knowledge: KnowledgeGatewayConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the structured incident database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Root directory for per-run handoff slots.
    #[serde(default = "default_handoff_dir")]
    pub handoff_dir: String,

    /// Directory final reports are written to.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            handoff_dir: default_handoff_dir(),
            reports_dir: default_reports_dir(),
        }
    }
}

fn default_db_path() -> String {
    "~/.incidentscout/it_support.db".into()
}
fn default_handoff_dir() -> String {
    "~/.incidentscout/handoff".into()
}
fn default_reports_dir() -> String {
    "~/.incidentscout/reports".into()
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// OpenAI-compatible chat-completions endpoint.
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_completion_model")]
    pub model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_completion_endpoint(),
            api_key_env: default_completion_key_env(),
            model: default_completion_model(),
        }
    }
}

fn default_completion_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_completion_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_completion_model() -> String {
    "gpt-4o-mini".into()
}

/// `[knowledge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGatewayConfig {
    /// Keyword-search endpoint.
    #[serde(default = "default_knowledge_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_knowledge_key_env")]
    pub api_key_env: String,

    /// Maximum documents to request per search.
    #[serde(default = "default_knowledge_limit")]
    pub max_results: u32,
}

impl Default for KnowledgeGatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_knowledge_endpoint(),
            api_key_env: default_knowledge_key_env(),
            max_results: default_knowledge_limit(),
        }
    }
}

fn default_knowledge_endpoint() -> String {
    "https://api.exa.ai/search".into()
}
fn default_knowledge_key_env() -> String {
    "EXA_API_KEY".into()
}
fn default_knowledge_limit() -> u32 {
    5
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.incidentscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| IncidentScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.incidentscout/incidentscout.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| IncidentScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        IncidentScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| IncidentScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IncidentScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| IncidentScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` in a configured path against the user's home.
pub fn expand_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Check that the completion API key env var is set and non-empty.
pub fn validate_completion_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.completion.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(IncidentScoutError::config(format!(
            "completion API key not found. Set the {var_name} environment variable."
        ))),
    }
}
