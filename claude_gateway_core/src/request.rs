//! The structured request that starts one agent invocation.
//!
//! Field names follow the JSON accepted by `POST /chat`, so the same type is
//! used by the HTTP layer for deserialisation and by the command builder.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::PathBuf;

fn default_model() -> Option<String> {
    Some("sonnet".to_string())
}

/// How the agent's `--debug` flag should be rendered.
///
/// Arrives on the wire as `true`, `false`, a category filter string, or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DebugMode {
    #[default]
    Off,
    On,
    Category(String),
}

impl Serialize for DebugMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DebugMode::Off => serializer.serialize_bool(false),
            DebugMode::On => serializer.serialize_bool(true),
            DebugMode::Category(category) => serializer.serialize_str(category),
        }
    }
}

impl<'de> Deserialize<'de> for DebugMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Category(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None | Some(Raw::Flag(false)) => DebugMode::Off,
            Some(Raw::Flag(true)) => DebugMode::On,
            Some(Raw::Category(category)) => DebugMode::Category(category),
        })
    }
}

/// Parameters for a single agent run.
///
/// Only `prompt` and `cwd` are required. Every optional field left as `None`
/// (or `false`) means the corresponding CLI option is not passed at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub prompt: String,
    pub cwd: PathBuf,

    #[serde(default = "default_model")]
    pub model: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,

    /// Session to resume.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub fork_session: Option<bool>,

    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub append_system_prompt: Option<String>,

    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default)]
    pub disallowed_tools: Option<Vec<String>>,

    #[serde(default)]
    pub permission_mode: Option<String>,

    #[serde(default)]
    pub mcp_config: Option<Vec<String>>,
    #[serde(default)]
    pub strict_mcp_config: Option<bool>,

    #[serde(default)]
    pub settings: Option<String>,
    #[serde(default)]
    pub add_dir: Option<Vec<String>>,

    #[serde(default)]
    pub debug: DebugMode,
    /// Accepted for compatibility; the agent always runs with `--verbose`.
    #[serde(default)]
    pub verbose: Option<bool>,

    #[serde(default)]
    pub json_schema: Option<Map<String, Value>>,
    #[serde(default)]
    pub agents: Option<Map<String, Value>>,
    #[serde(default)]
    pub plugin_dir: Option<Vec<String>>,
}

impl InvocationRequest {
    /// A request carrying only the required fields.
    pub fn new(prompt: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            cwd: cwd.into(),
            model: None,
            fallback_model: None,
            session_id: None,
            fork_session: None,
            system_prompt: None,
            append_system_prompt: None,
            tools: None,
            allowed_tools: None,
            disallowed_tools: None,
            permission_mode: None,
            mcp_config: None,
            strict_mcp_config: None,
            settings: None,
            add_dir: None,
            debug: DebugMode::Off,
            verbose: None,
            json_schema: None,
            agents: None,
            plugin_dir: None,
        }
    }
}
