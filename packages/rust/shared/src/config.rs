//! Application configuration for ExamForge.
//!
//! User config lives at `~/.examforge/examforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ExamForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "examforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".examforge";

// ---------------------------------------------------------------------------
// Config structs (matching examforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Content store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Pipeline limits and timeouts.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Instruction catalog settings.
    #[serde(default)]
    pub instructions: InstructionsConfig,

    /// Generative backends, in priority order.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            generation: GenerationConfig::default(),
            instructions: InstructionsConfig::default(),
            backends: default_backends(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}

/// Which content store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Embedded libSQL database on disk.
    Libsql,
    /// Process-local store, lost on exit.
    Memory,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub kind: StorageKind,

    /// Database file path (libsql only).
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: default_storage_kind(),
            path: default_storage_path(),
        }
    }
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Libsql
}
fn default_storage_path() -> String {
    "var/examforge.db".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Questions served when a request omits `count`.
    #[serde(default = "default_count")]
    pub default_count: usize,

    /// Upper bound on `count` per request.
    #[serde(default = "default_max_count")]
    pub max_count: usize,

    /// Cache pool size as a multiple of the requested count.
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,

    /// Per-backend invocation timeout.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Upper bound on the detached cache write.
    #[serde(default = "default_cache_write_timeout")]
    pub cache_write_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
            oversample_factor: default_oversample_factor(),
            attempt_timeout_secs: default_attempt_timeout(),
            cache_write_timeout_secs: default_cache_write_timeout(),
        }
    }
}

fn default_count() -> usize {
    5
}
fn default_max_count() -> usize {
    20
}
fn default_oversample_factor() -> usize {
    2
}
fn default_attempt_timeout() -> u64 {
    60
}
fn default_cache_write_timeout() -> u64 {
    30
}

/// `[instructions]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstructionsConfig {
    /// Optional TOML file replacing the built-in instruction catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<String>,
}

/// Wire protocol spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible `chat/completions` (OpenAI, Groq, OpenRouter, ...).
    Openai,
    /// Google Gemini `generateContent`.
    Gemini,
}

/// `[[backends]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name used in logs and `/health`.
    pub name: String,
    pub kind: BackendKind,
    /// API root, e.g. `https://api.groq.com/openai/v1`.
    pub base_url: Url,
    pub model: String,
    /// Name of the env var holding the API key (never store the key itself).
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}

fn default_backends() -> Vec<BackendConfig> {
    let entry = |name: &str, kind, base_url: &str, model: &str, api_key_env: &str| BackendConfig {
        name: name.into(),
        kind,
        base_url: Url::parse(base_url).expect("valid default backend URL"),
        model: model.into(),
        api_key_env: api_key_env.into(),
        temperature: default_temperature(),
        max_tokens: default_max_tokens(),
    };

    vec![
        entry(
            "gemini",
            BackendKind::Gemini,
            "https://generativelanguage.googleapis.com/v1beta",
            "gemini-2.0-flash",
            "GEMINI_API_KEY",
        ),
        entry(
            "groq",
            BackendKind::Openai,
            "https://api.groq.com/openai/v1",
            "llama-3.3-70b-versatile",
            "GROQ_API_KEY",
        ),
        entry(
            "openrouter",
            BackendKind::Openai,
            "https://openrouter.ai/api/v1",
            "meta-llama/llama-3.3-70b-instruct",
            "OPENROUTER_API_KEY",
        ),
    ]
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, derived from the file config)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, derived from [`GenerationConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub default_count: usize,
    pub max_count: usize,
    pub oversample_factor: usize,
    pub attempt_timeout: Duration,
    pub cache_write_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let g = &config.generation;
        Self {
            default_count: g.default_count,
            max_count: g.max_count,
            oversample_factor: g.oversample_factor.max(1),
            attempt_timeout: Duration::from_secs(g.attempt_timeout_secs),
            cache_write_timeout: Duration::from_secs(g.cache_write_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.examforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ExamForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.examforge/examforge.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ExamForgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ExamForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ExamForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ExamForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ExamForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let g = &config.generation;
    if g.default_count == 0 || g.max_count == 0 {
        return Err(ExamForgeError::config(
            "generation.default_count and generation.max_count must be at least 1",
        ));
    }
    if g.default_count > g.max_count {
        return Err(ExamForgeError::config(format!(
            "generation.default_count ({}) exceeds generation.max_count ({})",
            g.default_count, g.max_count
        )));
    }
    if g.attempt_timeout_secs == 0 {
        return Err(ExamForgeError::config(
            "generation.attempt_timeout_secs must be at least 1",
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for backend in &config.backends {
        if !seen.insert(backend.name.as_str()) {
            return Err(ExamForgeError::config(format!(
                "duplicate backend name '{}'",
                backend.name
            )));
        }
    }
    Ok(())
}

/// Read the API key for a backend from its configured env var.
pub fn resolve_api_key(backend: &BackendConfig) -> Result<String> {
    let var_name = &backend.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ExamForgeError::config(format!(
            "API key for backend '{}' not found. Set the {var_name} environment variable.",
            backend.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("bind"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.generation.default_count, 5);
        assert_eq!(parsed.backends.len(), 3);
        assert_eq!(parsed.backends[0].name, "gemini");
        assert_eq!(parsed.storage.kind, StorageKind::Libsql);
    }

    #[test]
    fn config_with_custom_backends() {
        let toml_str = r#"
[storage]
kind = "memory"

[[backends]]
name = "local"
kind = "openai"
base_url = "http://localhost:11434/v1"
model = "llama3"
api_key_env = "LOCAL_KEY"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.storage.kind, StorageKind::Memory);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].kind, BackendKind::Openai);
        assert_eq!(config.backends[0].max_tokens, 8192);
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.default_count, 5);
        assert_eq!(pipeline.max_count, 20);
        assert_eq!(pipeline.oversample_factor, 2);
        assert_eq!(pipeline.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn validation_rejects_bad_limits() {
        let mut config = AppConfig::default();
        config.generation.default_count = 30;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.backends.push(config.backends[0].clone());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate backend"));
    }

    #[test]
    fn api_key_resolution() {
        let mut backend = AppConfig::default().backends.remove(0);
        // Use a unique env var name to avoid interfering with other tests
        backend.api_key_env = "EF_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&backend);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
