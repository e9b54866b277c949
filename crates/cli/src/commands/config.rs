use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use procura_core::config::{AppConfig, GatewayMode, LogFormat};
use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Value;

use super::{load_config, CommandResult, GlobalOptions};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the layer each value came from. Tokens are redacted.
pub fn run(options: &GlobalOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("config", error_class, message, exit_code);
        }
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source_of = |key: &str, env_key: &str| {
        field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let entries: Vec<ConfigEntry> = effective_values(&config)
        .into_iter()
        .map(|(key, env_key, value)| {
            let source = if key == "database.url" && options.database_url.is_some() {
                "flag (--database-url)".to_string()
            } else {
                source_of(key, env_key)
            };
            ConfigEntry { key, value, source }
        })
        .collect();

    let data = match serde_json::to_value(&entries) {
        Ok(data) => data,
        Err(error) => {
            return CommandResult::failure("config", "serialization", error.to_string(), 1);
        }
    };
    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: flag > env > file > default)",
        Some(data),
    )
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    let gateway_mode = match config.gateway.mode {
        GatewayMode::Local => "local",
        GatewayMode::Remote => "remote",
    };
    let log_format = match config.logging.format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    };
    let api_token = config
        .gateway
        .api_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        ("database.url", "PROCURA_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "PROCURA_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "PROCURA_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("gateway.mode", "PROCURA_GATEWAY_MODE", gateway_mode.to_string()),
        (
            "gateway.base_url",
            "PROCURA_GATEWAY_BASE_URL",
            config.gateway.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("gateway.api_token", "PROCURA_GATEWAY_API_TOKEN", api_token),
        (
            "gateway.timeout_secs",
            "PROCURA_GATEWAY_TIMEOUT_SECS",
            config.gateway.timeout_secs.to_string(),
        ),
        (
            "review.target_discount_factor",
            "PROCURA_REVIEW_TARGET_DISCOUNT_FACTOR",
            config.review.target_discount_factor.to_string(),
        ),
        (
            "review.history_window",
            "PROCURA_REVIEW_HISTORY_WINDOW",
            config.review.history_window.to_string(),
        ),
        ("logging.level", "PROCURA_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "PROCURA_LOGGING_FORMAT", log_format.to_string()),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    [PathBuf::from("procura.toml"), PathBuf::from("config/procura.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    match trimmed.get(..4) {
        Some(prefix) if trimmed.len() > 8 => format!("{prefix}***"),
        _ => "<redacted>".to_string(),
    }
}
