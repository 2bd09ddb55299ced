use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use qabot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let rows: Vec<(&str, &str, String)> = vec![
        ("database.url", "QABOT_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "QABOT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "QABOT_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("bot.token", "BOT_TOKEN", redact_token(config.bot.token.expose_secret())),
        ("bot.chat_id", "CHAT_ID", config.bot.chat_id.to_string()),
        ("bot.utils_topic_id", "UTILS_TOPIC_ID", config.bot.topics.utils.to_string()),
        ("bot.qa_topic_id", "QA_TOPIC_ID", config.bot.topics.qa.to_string()),
        (
            "bot.notifications_topic_id",
            "NOTIFICATIONS_TOPIC_ID",
            config.bot.topics.notifications.to_string(),
        ),
        ("bot.control_mode", "QABOT_CONTROL_MODE", format!("{:?}", config.bot.control_mode)),
        ("bot.api_base", "QABOT_API_BASE", config.bot.api_base.clone()),
        (
            "bot.poll_timeout_secs",
            "QABOT_POLL_TIMEOUT_SECS",
            config.bot.poll_timeout_secs.to_string(),
        ),
        (
            "bot.request_timeout_secs",
            "QABOT_REQUEST_TIMEOUT_SECS",
            config.bot.request_timeout_secs.to_string(),
        ),
        ("server.bind_address", "QABOT_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        (
            "server.health_check_port",
            "QABOT_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        ("logging.level", "QABOT_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "QABOT_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key, value) in rows {
        let source = field_source(
            key_path,
            env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["qabot.toml", "config/qabot.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the public bot id and hides the secret half.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}
