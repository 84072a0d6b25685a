use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use coverwise_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let base_url = match config.llm.base_url.as_deref() {
        Some(url) => url.to_string(),
        None => format!("{} (provider default)", config.llm_base_url()),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: &str, env_keys: &[&str]| {
        lines.push(render_line(key, value, source(key, env_keys)));
    };

    push("llm.provider", &format!("{:?}", config.llm.provider), &["COVERWISE_LLM_PROVIDER"]);
    push("llm.model", &config.llm.model, &["COVERWISE_LLM_MODEL"]);
    push("llm.base_url", &base_url, &["COVERWISE_LLM_BASE_URL"]);
    push("llm.api_key", &api_key, &["COVERWISE_LLM_API_KEY"]);
    push(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        &["COVERWISE_LLM_TIMEOUT_SECS"],
    );
    push("llm.max_retries", &config.llm.max_retries.to_string(), &["COVERWISE_LLM_MAX_RETRIES"]);
    push("llm.temperature", &config.llm.temperature.to_string(), &["COVERWISE_LLM_TEMPERATURE"]);
    push(
        "agent.history_limit",
        &config.agent.history_limit.to_string(),
        &["COVERWISE_AGENT_HISTORY_LIMIT"],
    );
    push("agent.actor", &config.agent.actor, &["COVERWISE_AGENT_ACTOR"]);
    push("logging.level", &config.logging.level, &["COVERWISE_LOGGING_LEVEL", "COVERWISE_LOG_LEVEL"]);
    push(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["COVERWISE_LOGGING_FORMAT", "COVERWISE_LOG_FORMAT"],
    );

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a provider prefix such as `sk-` visible and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
