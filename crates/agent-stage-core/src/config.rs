//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::AgentId;

/// Top-level Agent Stage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Real-time channel connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Socket.IO server URL (`http(s)://` or `ws(s)://`). Without a path,
    /// the standard `/socket.io/` endpoint is used.
    #[serde(default = "default_channel_url")]
    pub url: String,

    /// Socket.IO namespace the stage events are emitted on (default: "/").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Connect timeout in ms (default: 10000).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_channel_url() -> String {
    "http://127.0.0.1:5000".into()
}

fn default_namespace() -> String {
    crate::socketio::ROOT_NAMESPACE.into()
}

fn default_connect_timeout() -> u64 {
    10_000
}

/// Easing curve names accepted in config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingName {
    Linear,
    Swing,
    #[default]
    OutElastic,
}

/// Animation timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Container fade duration in ms (default: 500).
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u64,

    /// Animator tick interval in ms (default: 16).
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,

    /// Vertical offset each letter rises to (default: -2).
    #[serde(default = "default_letter_rise")]
    pub letter_rise: f32,

    /// Duration of each half of the letter bob in ms (default: 1000).
    #[serde(default = "default_letter_phase_ms")]
    pub letter_phase_ms: u64,

    /// Start delay between consecutive letters in ms (default: 30).
    #[serde(default = "default_letter_stagger_ms")]
    pub letter_stagger_ms: u64,

    #[serde(default)]
    pub letter_easing: EasingName,
}

fn default_fade_ms() -> u64 {
    500
}

fn default_frame_ms() -> u64 {
    16
}

fn default_letter_rise() -> f32 {
    -2.0
}

fn default_letter_phase_ms() -> u64 {
    1000
}

fn default_letter_stagger_ms() -> u64 {
    30
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            fade_ms: default_fade_ms(),
            frame_ms: default_frame_ms(),
            letter_rise: default_letter_rise(),
            letter_phase_ms: default_letter_phase_ms(),
            letter_stagger_ms: default_letter_stagger_ms(),
            letter_easing: EasingName::default(),
        }
    }
}

/// Element id prefixes and class names the stage page uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,

    #[serde(default = "default_text_prefix")]
    pub text_prefix: String,

    #[serde(default = "default_letter_class")]
    pub letter_class: String,

    #[serde(default = "default_word_class")]
    pub word_class: String,

    /// Agents whose containers are pre-rendered on the stage (default: 1, 2, 3).
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentId>,
}

fn default_container_prefix() -> String {
    "agent-container-".into()
}

fn default_text_prefix() -> String {
    "agent-text-".into()
}

fn default_letter_class() -> String {
    "agent-letter".into()
}

fn default_word_class() -> String {
    "agent-word".into()
}

fn default_agents() -> Vec<AgentId> {
    (1..=3u32).map(AgentId::from).collect()
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            container_prefix: default_container_prefix(),
            text_prefix: default_text_prefix(),
            letter_class: default_letter_class(),
            word_class: default_word_class(),
            agents: default_agents(),
        }
    }
}

impl DocumentConfig {
    /// Element id of an agent's container.
    pub fn container_id(&self, agent: &AgentId) -> String {
        format!("{}{}", self.container_prefix, agent)
    }

    /// Element id of an agent's text element.
    pub fn text_id(&self, agent: &AgentId) -> String {
        format!("{}{}", self.text_prefix, agent)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "agent_stage_view=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::StageError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::StageError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Channel URL.
    pub fn channel_url(&self) -> String {
        self.channel
            .as_ref()
            .map(|c| c.url.clone())
            .unwrap_or_else(default_channel_url)
    }

    /// Socket.IO namespace.
    pub fn channel_namespace(&self) -> String {
        self.channel
            .as_ref()
            .map(|c| c.namespace.clone())
            .unwrap_or_else(default_namespace)
    }

    /// Channel connect timeout in ms.
    pub fn connect_timeout_ms(&self) -> u64 {
        self.channel
            .as_ref()
            .map(|c| c.connect_timeout_ms)
            .unwrap_or_else(default_connect_timeout)
    }

    /// Animation timing, falling back to the defaults.
    pub fn animation(&self) -> AnimationConfig {
        self.animation.clone().unwrap_or_default()
    }

    /// Document naming, falling back to the defaults.
    pub fn document(&self) -> DocumentConfig {
        self.document.clone().unwrap_or_default()
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(channel) = &self.channel {
            let schemes = ["http://", "https://", "ws://", "wss://"];
            if !schemes.iter().any(|s| channel.url.starts_with(s)) {
                errors.push(format!(
                    "Channel URL must use http(s):// or ws(s)://: {}",
                    channel.url
                ));
            }
            if !channel.namespace.starts_with('/') {
                errors.push(format!(
                    "Channel namespace must start with '/': {}",
                    channel.namespace
                ));
            }
            if channel.connect_timeout_ms == 0 {
                errors.push("Channel connect timeout cannot be 0".to_string());
            }
        }

        if let Some(anim) = &self.animation {
            if anim.frame_ms == 0 {
                errors.push("Animation frame interval cannot be 0".to_string());
            }
            if anim.letter_phase_ms == 0 {
                errors.push("Letter phase duration cannot be 0".to_string());
            }
            if anim.fade_ms == 0 {
                warnings.push("Fade duration is 0; containers will snap".to_string());
            }
            if anim.frame_ms > anim.letter_phase_ms {
                warnings.push(format!(
                    "Frame interval {}ms is longer than a letter phase ({}ms)",
                    anim.frame_ms, anim.letter_phase_ms
                ));
            }
        }

        if let Some(doc) = &self.document {
            if doc.container_prefix == doc.text_prefix {
                errors.push("Container and text prefixes must differ".to_string());
            }
            for (name, class) in [("letter", &doc.letter_class), ("word", &doc.word_class)] {
                if class.is_empty() || class.contains(char::is_whitespace) {
                    errors.push(format!("Invalid {name} class name: {class:?}"));
                }
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                warnings.push(format!(
                    "Unknown log format '{}', using plain",
                    logging.format
                ));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Agent Stage data: `~/.agent_stage/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent_stage")
}
