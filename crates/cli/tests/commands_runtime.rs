use std::env;
use std::sync::{Mutex, OnceLock};

use coverwise_cli::commands::{chat, config, doctor};
use serde_json::Value;

#[test]
fn config_reports_env_sources_and_defaults() {
    with_env(&[("COVERWISE_LLM_MODEL", "llama3.2"), ("COVERWISE_LOG_LEVEL", "debug")], || {
        let output = config::run();

        assert!(output.starts_with("effective config (source precedence: env > file > default):"));
        assert!(output.contains("- llm.model = llama3.2 (source: env (COVERWISE_LLM_MODEL))"));
        assert!(output.contains("- logging.level = debug (source: env (COVERWISE_LOG_LEVEL))"));
        assert!(output.contains("- agent.history_limit = 20 (source: default)"));
        assert!(output.contains("- llm.api_key = <unset> (source: default)"));
    });
}

#[test]
fn config_redacts_api_key() {
    with_env(
        &[("COVERWISE_LLM_PROVIDER", "openai"), ("COVERWISE_LLM_API_KEY", "sk-test-0123456789")],
        || {
            let output = config::run();

            assert!(output.contains("- llm.api_key = sk-*** (source: env (COVERWISE_LLM_API_KEY))"));
            assert!(!output.contains("0123456789"));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("COVERWISE_AGENT_HISTORY_LIMIT", "0")], || {
        let output = config::run();

        assert!(output.starts_with("config validation failed:"), "unexpected output: {output}");
    });
}

#[test]
fn doctor_passes_with_default_ollama_config() {
    with_env(&[], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(names, ["config_validation", "llm_credentials", "llm_client", "product_catalog"]);
    });
}

#[test]
fn doctor_fails_when_openai_key_missing() {
    with_env(&[("COVERWISE_LLM_PROVIDER", "openai")], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][3]["status"], "pass");
    });
}

#[test]
fn doctor_human_output_marks_each_check() {
    with_env(&[], || {
        let output = doctor::run(false);

        assert_eq!(output.lines().next(), Some("doctor: all readiness checks passed"));
        assert!(output.contains("- [ok] product_catalog: products registered: CAR, CHOICE, EARLY"));
    });
}

#[test]
fn chat_refuses_to_start_with_invalid_config() {
    with_env(&[("COVERWISE_LLM_TEMPERATURE", "7.5")], || {
        let result = chat::run(Some("s-1".to_string()));
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "chat");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "COVERWISE_LLM_PROVIDER",
        "COVERWISE_LLM_API_KEY",
        "COVERWISE_LLM_BASE_URL",
        "COVERWISE_LLM_MODEL",
        "COVERWISE_LLM_TIMEOUT_SECS",
        "COVERWISE_LLM_MAX_RETRIES",
        "COVERWISE_LLM_TEMPERATURE",
        "COVERWISE_AGENT_HISTORY_LIMIT",
        "COVERWISE_AGENT_ACTOR",
        "COVERWISE_LOGGING_LEVEL",
        "COVERWISE_LOGGING_FORMAT",
        "COVERWISE_LOG_LEVEL",
        "COVERWISE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
