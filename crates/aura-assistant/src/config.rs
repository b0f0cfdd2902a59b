//! Assistant configuration
//!
//! Built from defaults, then optionally overridden from `AURA_*` environment
//! variables. Unparseable values are logged and ignored.

use std::time::Duration;

use aura_core::{AgentConfig, provider::GenerationOptions};

use crate::AURA_SYSTEM_PROMPT;
use crate::model::InteractionMode;

/// Matches the completion route's own 30 second budget
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_TOOL_ROUNDTRIPS: usize = 3;

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub generation: GenerationOptions,

    /// Upper bound on how long the busy flag may stay raised
    pub busy_safety_timeout: Duration,

    pub max_tool_roundtrips: usize,

    pub mode: InteractionMode,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            generation: GenerationOptions {
                system_prompt: Some(AURA_SYSTEM_PROMPT.into()),
                ..GenerationOptions::default()
            },
            busy_safety_timeout: DEFAULT_BUSY_TIMEOUT,
            max_tool_roundtrips: DEFAULT_MAX_TOOL_ROUNDTRIPS,
            mode: InteractionMode::default(),
        }
    }
}

impl AssistantConfig {
    /// Defaults overridden by `AURA_MODEL`, `AURA_TEMPERATURE`,
    /// `AURA_MAX_TOKENS`, `AURA_SYSTEM_PROMPT`, `AURA_BUSY_TIMEOUT_MS`,
    /// `AURA_MAX_TOOL_ROUNDTRIPS` and `AURA_MODE`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(model) = lookup("AURA_MODEL").filter(|m| !m.trim().is_empty()) {
            config.generation.model = model;
        }
        if let Some(temperature) = parse_var::<f32>(&lookup, "AURA_TEMPERATURE") {
            config.generation.temperature = temperature;
        }
        if let Some(max) = parse_var::<u32>(&lookup, "AURA_MAX_TOKENS").filter(|m| *m > 0) {
            config.generation.max_tokens = max;
        }
        if let Some(prompt) = lookup("AURA_SYSTEM_PROMPT").filter(|p| !p.trim().is_empty()) {
            config.generation.system_prompt = Some(prompt);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "AURA_BUSY_TIMEOUT_MS").filter(|ms| *ms > 0) {
            config.busy_safety_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<usize>(&lookup, "AURA_MAX_TOOL_ROUNDTRIPS") {
            config.max_tool_roundtrips = max;
        }
        if let Some(mode) = parse_var::<InteractionMode>(&lookup, "AURA_MODE") {
            config.mode = mode;
        }

        config
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.generation.model = model.into();
        self
    }

    pub const fn with_busy_safety_timeout(mut self, timeout: Duration) -> Self {
        self.busy_safety_timeout = timeout;
        self
    }

    pub const fn with_max_tool_roundtrips(mut self, max: usize) -> Self {
        self.max_tool_roundtrips = max;
        self
    }

    pub const fn with_mode(mut self, mode: InteractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Settings for the model/tool loop
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            generation: self.generation.clone(),
            max_tool_roundtrips: self.max_tool_roundtrips,
            ..AgentConfig::default()
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid setting");
            None
        }
    }
}
