//! Translation of an [`InvocationRequest`] into the agent's argument vector.
//!
//! The mapping is pure: no filesystem or network access. The three mandatory
//! flags always lead and `-p <prompt>` always trails, because the agent's
//! argument parser lets list-valued options swallow every following token.

use crate::request::{DebugMode, InvocationRequest};
use serde_json::{Map, Value};

pub const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";
pub const VERBOSE_FLAG: &str = "--verbose";
pub const OUTPUT_FORMAT_FLAG: &str = "--output-format";
pub const STREAM_JSON: &str = "stream-json";
pub const PROMPT_FLAG: &str = "-p";

/// Arguments that precede every optional flag.
pub fn mandatory_args() -> [&'static str; 4] {
    [
        SKIP_PERMISSIONS_FLAG,
        VERBOSE_FLAG,
        OUTPUT_FORMAT_FLAG,
        STREAM_JSON,
    ]
}

/// Build the argument vector (without the program path) for `request`.
pub fn build_args(request: &InvocationRequest) -> Vec<String> {
    let mut args: Vec<String> = mandatory_args().iter().map(|s| s.to_string()).collect();

    push_value(&mut args, "--model", request.model.as_deref());
    push_value(&mut args, "--resume", request.session_id.as_deref());
    push_switch(&mut args, "--fork-session", request.fork_session);
    push_value(&mut args, "--fallback-model", request.fallback_model.as_deref());

    push_value(&mut args, "--system-prompt", request.system_prompt.as_deref());
    push_value(
        &mut args,
        "--append-system-prompt",
        request.append_system_prompt.as_deref(),
    );

    // An explicit empty enable-list is meaningful: it turns every tool off.
    if let Some(tools) = &request.tools {
        args.push("--tools".to_string());
        args.push(tools.join(","));
    }
    push_list(&mut args, "--allowed-tools", request.allowed_tools.as_deref());
    push_list(
        &mut args,
        "--disallowed-tools",
        request.disallowed_tools.as_deref(),
    );

    push_value(&mut args, "--permission-mode", request.permission_mode.as_deref());

    push_list(&mut args, "--mcp-config", request.mcp_config.as_deref());
    push_switch(&mut args, "--strict-mcp-config", request.strict_mcp_config);

    push_value(&mut args, "--settings", request.settings.as_deref());
    push_list(&mut args, "--add-dir", request.add_dir.as_deref());

    match &request.debug {
        DebugMode::Off => {}
        DebugMode::On => args.push("--debug".to_string()),
        DebugMode::Category(category) => {
            args.push("--debug".to_string());
            args.push(category.clone());
        }
    }

    push_json(&mut args, "--json-schema", request.json_schema.as_ref());
    push_json(&mut args, "--agents", request.agents.as_ref());
    push_list(&mut args, "--plugin-dir", request.plugin_dir.as_deref());

    args.push(PROMPT_FLAG.to_string());
    args.push(request.prompt.clone());
    args
}

/// Render `args` for logging with the prompt text replaced by its length.
pub fn redacted(args: &[String]) -> String {
    let mut shown: Vec<String> = args.to_vec();
    if let [.., flag, prompt] = shown.as_mut_slice()
        && flag.as_str() == PROMPT_FLAG
    {
        *prompt = format!("<prompt: {} chars>", prompt.chars().count());
    }
    shown.join(" ")
}

fn push_value(args: &mut Vec<String>, flag: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

fn push_switch(args: &mut Vec<String>, flag: &str, enabled: Option<bool>) {
    if enabled == Some(true) {
        args.push(flag.to_string());
    }
}

fn push_list(args: &mut Vec<String>, flag: &str, values: Option<&[String]>) {
    if let Some(values) = values.filter(|v| !v.is_empty()) {
        args.push(flag.to_string());
        args.extend(values.iter().cloned());
    }
}

fn push_json(args: &mut Vec<String>, flag: &str, value: Option<&Map<String, Value>>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        args.push(flag.to_string());
        args.push(Value::Object(value.clone()).to_string());
    }
}
