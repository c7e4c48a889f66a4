use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KindredConfig {
    pub general: GeneralConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub memory: MemoryConfig,
    pub persona: PersonaConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Fixed user identifier. When unset, `user@host` is derived at startup.
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub model: String,
    pub api_keys: Vec<String>,
    pub rate_limit_per_key: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub auto_extract: bool,
    pub background_extraction: bool,
    /// Recent turns recalled for users who never ran `!memory <n>`.
    pub default_window: u32,
    /// Recent turns also sent to the model as structured history.
    pub history_turns: usize,
    pub context_budget_chars: usize,
    pub snippet_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub instructions: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".into(),
            user_id: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_kindred_dir()
            .join("kindred.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            api_keys: Vec::new(),
            rate_limit_per_key: 60,
            max_retries: 3,
            retry_backoff_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            auto_extract: true,
            background_extraction: true,
            default_window: 10,
            history_turns: 2,
            context_budget_chars: 2400,
            snippet_chars: 100,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Kindred".into(),
            instructions: "You are Kindred, a warm and witty companion living in the user's \
                           terminal. Use what you remember about the user naturally, without \
                           reciting it. Keep answers under 1800 characters."
                .into(),
        }
    }
}

/// Returns `~/.kindred/`, or `./.kindred/` when no home directory is known.
pub fn default_kindred_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kindred")
}

/// Returns the default config file path: `~/.kindred/config.toml`
pub fn default_config_path() -> PathBuf {
    default_kindred_dir().join("config.toml")
}

impl KindredConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            KindredConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (KINDRED_DB, KINDRED_USER,
    /// KINDRED_LOG_LEVEL, KINDRED_MODEL) and collect Gemini API keys.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KINDRED_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("KINDRED_USER") {
            self.general.user_id = Some(val);
        }
        if let Ok(val) = std::env::var("KINDRED_LOG_LEVEL") {
            self.general.log_level = val;
        }
        if let Ok(val) = std::env::var("KINDRED_MODEL") {
            self.api.model = val;
        }
        for key in api_keys_from_env() {
            if !self.api.api_keys.contains(&key) {
                self.api.api_keys.push(key);
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// The configured user id, or `user@host` derived from the environment.
    pub fn resolved_user_id(&self) -> String {
        if let Some(id) = &self.general.user_id {
            return id.clone();
        }
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "terminal_user".into());
        match std::env::var("HOSTNAME") {
            Ok(host) if !host.is_empty() => format!("{user}@{host}"),
            _ => user,
        }
    }
}

/// `GEMINI_API_KEY`, then `GEMINI_API_KEY_2`, `GEMINI_API_KEY_3`, ... until the first gap.
fn api_keys_from_env() -> Vec<String> {
    let mut keys = Vec::new();
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            keys.push(key);
        }
    }
    let mut i = 2;
    while let Ok(key) = std::env::var(format!("GEMINI_API_KEY_{i}")) {
        if !key.is_empty() {
            keys.push(key);
        }
        i += 1;
    }
    keys
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
