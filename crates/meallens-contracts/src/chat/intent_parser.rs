use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, ENTRY_COMMANDS, ENTRY_VALUE_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
    SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: impl Into<String>) -> Self {
        self.command_args
            .insert(key.to_string(), Value::String(value.into()));
        self
    }

    /// String argument, `None` when absent or blank.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    parse_path_args(arg).join(" ")
}

/// Splits `"<id> rest of line"` into the id token and the trimmed rest.
fn split_entry_arg(arg: &str) -> (&str, &str) {
    let trimmed = arg.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((id, rest)) => (id, rest.trim()),
        None => (trimmed, ""),
    }
}

/// Turns one REPL line into an intent. Lines without a leading `/` are the
/// free-text "add a food" field.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                return Intent::new(action, text).with_arg("name", arg);
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(action, text).with_arg("path", parse_single_path_arg(arg));
            }

            if let Some(action) = find_action(&command, ENTRY_COMMANDS) {
                let (id, _) = split_entry_arg(arg);
                return Intent::new(action, text).with_arg("id", id);
            }

            if let Some(action) = find_action(&command, ENTRY_VALUE_COMMANDS) {
                let (id, rest) = split_entry_arg(arg);
                let key = if action == "register" { "slot" } else { "name" };
                return Intent::new(action, text)
                    .with_arg("id", id)
                    .with_arg(key, rest);
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            return Intent::new("unknown", text)
                .with_arg("command", command)
                .with_arg("arg", arg);
        }
    }

    Intent::new("add_manual", text).with_arg("name", raw_trimmed)
}
