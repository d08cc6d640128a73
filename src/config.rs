use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{GrounderError, GrounderResult};
use crate::llm::types::SamplingParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sampling: SamplingParams,
    /// Platform annotation sent to the model ("WIN", "Mac", "Mobile");
    /// detected from the host OS when absent.
    #[serde(default)]
    pub platform: Option<String>,
    /// Key into the output-format instruction table.
    #[serde(default = "default_format_key")]
    pub format_key: String,
    /// Where round images and annotations land; defaults under the user
    /// cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Falls back to the GROUNDER_API_KEY env var, then "EMPTY" for
    /// keyless local servers.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            sampling: SamplingParams::default(),
            platform: None,
            format_key: default_format_key(),
            cache_dir: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:7870/v1".to_string()
}

fn default_model() -> String {
    "CogAgent".to_string()
}

fn default_format_key() -> String {
    crate::engine::prompt::DEFAULT_FORMAT_KEY.to_string()
}

impl AgentConfig {
    pub fn from_toml_str(content: &str) -> GrounderResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn resolved_platform(&self) -> String {
        self.platform.clone().unwrap_or_else(|| identify_os().to_string())
    }

    pub fn resolved_api_key(&self) -> String {
        self.api
            .api_key
            .clone()
            .or_else(|| std::env::var("GROUNDER_API_KEY").ok())
            .unwrap_or_else(|| "EMPTY".to_string())
    }

    /// Cache directory for round images, created if missing.
    pub fn ensure_cache_dir(&self) -> GrounderResult<PathBuf> {
        let dir = self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("grounder")
                .join("caches")
        });
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Map the host OS to the platform annotation the model was trained with.
pub fn identify_os() -> &'static str {
    if std::env::consts::OS == "macos" {
        "Mac"
    } else {
        "WIN"
    }
}

fn resolve_config_path() -> GrounderResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(GrounderError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Load config.toml, with a .env file (if any) providing env fallbacks.
pub fn load_config() -> GrounderResult<AgentConfig> {
    let _ = dotenvy::dotenv();
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = AgentConfig::from_toml_str(&content)?;
    tracing::info!(path = %path.display(), model = %config.api.model, "config loaded");
    Ok(config)
}
