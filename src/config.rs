// Debate engine configuration
// Defaults, then ~/.aegis/config.toml, then AEGIS_* environment overrides

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables for a debate run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Hard ceiling on debate rounds.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Per-call timeout for one agent invocation, in seconds.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    /// Attempts per agent invocation (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts, in
    /// milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_max_rounds() -> u32 {
    3
}

fn default_agent_timeout_secs() -> u64 {
    45
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            agent_timeout_secs: default_agent_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl DebateConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Load configuration with layered sources: built-in defaults, then
    /// `~/.aegis/config.toml` if present, then `AEGIS_*` environment
    /// variables (e.g. `AEGIS_MAX_ROUNDS=5`).
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("AEGIS").try_parsing(true))
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Invalid debate configuration")
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".aegis/config.toml"))
}
