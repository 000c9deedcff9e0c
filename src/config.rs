//! Process configuration, read once from the environment

use crate::llm::{OpenAiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::runtime::SessionConfig;
use crate::system_prompt::{build_system_prompt, PromptFileError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error(transparent)]
    PromptFile(#[from] PromptFileError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub openai: OpenAiConfig,
    pub session: SessionConfig,
    /// Live sessions untouched for this long are dropped from memory
    pub session_idle: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset and empty variables take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_path = var("TRIAGE_DB_PATH").map_or_else(default_db_path, PathBuf::from);
        let port = match var("TRIAGE_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "TRIAGE_PORT",
                expected: "a port number",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let model = var("TRIAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_key = var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("OPENAI_API_KEY is not set, model requests will be rejected");
        }
        let openai = OpenAiConfig {
            api_key,
            base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.clone(),
        };

        let replacement = var("TRIAGE_SYSTEM_PROMPT_FILE").map(PathBuf::from);
        let guidance = var("TRIAGE_GUIDANCE_FILE").map(PathBuf::from);
        let system_prompt = build_system_prompt(replacement.as_deref(), guidance.as_deref())?;

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            model,
            system_prompt: Arc::from(system_prompt),
            tool_settle_delay: millis(&var, "TRIAGE_TOOL_DELAY_MS")?
                .unwrap_or(defaults.tool_settle_delay),
            purchase_step: millis(&var, "TRIAGE_PURCHASE_STEP_MS")?
                .unwrap_or(defaults.purchase_step),
            shutdown_grace: millis(&var, "TRIAGE_SHUTDOWN_GRACE_MS")?
                .unwrap_or(defaults.shutdown_grace),
            ..defaults
        };

        let session_idle = match var("TRIAGE_SESSION_IDLE_SECS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid {
                    name: "TRIAGE_SESSION_IDLE_SECS",
                    expected: "a positive number of seconds",
                    value,
                })?,
            None => DEFAULT_SESSION_IDLE,
        };

        Ok(Self {
            db_path,
            port,
            openai,
            session,
            session_idle,
        })
    }
}

fn millis(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    var(name)
        .map(|value| {
            value
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::Invalid {
                    name,
                    expected: "a number of milliseconds",
                    value,
                })
        })
        .transpose()
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".triage-desk").join("triage.db")
}
