use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topics::TopicIds;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub bot: BotConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub token: SecretString,
    pub chat_id: i64,
    pub topics: TopicIds,
    pub control_mode: ControlMode,
    pub api_base: String,
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How control messages are presented in a topic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// One pinned message per topic, edited in place.
    #[default]
    Pinned,
    /// A fresh unpinned message per command, consumed by the interaction.
    Ephemeral,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub chat_id: Option<i64>,
    pub utils_topic_id: Option<i64>,
    pub qa_topic_id: Option<i64>,
    pub notifications_topic_id: Option<i64>,
    pub control_mode: Option<ControlMode>,
    pub api_base: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("{key} is required (set {env})")]
    MissingRequired { key: &'static str, env: &'static str },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://qa-bot.db?mode=rwc".to_string(),
                max_connections: 1,
                timeout_secs: 30,
            },
            bot: BotConfig {
                token: String::new().into(),
                chat_id: 0,
                topics: TopicIds { utils: 0, qa: 0, notifications: 0 },
                control_mode: ControlMode::Pinned,
                api_base: DEFAULT_API_BASE.to_string(),
                poll_timeout_secs: 30,
                request_timeout_secs: 15,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), health_check_port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ControlMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pinned" | "persistent" => Ok(Self::Pinned),
            "ephemeral" => Ok(Self::Ephemeral),
            other => Err(ConfigError::Validation(format!(
                "unsupported control mode `{other}` (expected pinned|ephemeral)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("qabot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(bot) = patch.bot {
            if let Some(bot_token_value) = bot.token {
                self.bot.token = secret_value(bot_token_value);
            }
            if let Some(chat_id) = bot.chat_id {
                self.bot.chat_id = chat_id;
            }
            if let Some(utils_topic_id) = bot.utils_topic_id {
                self.bot.topics.utils = utils_topic_id;
            }
            if let Some(qa_topic_id) = bot.qa_topic_id {
                self.bot.topics.qa = qa_topic_id;
            }
            if let Some(notifications_topic_id) = bot.notifications_topic_id {
                self.bot.topics.notifications = notifications_topic_id;
            }
            if let Some(control_mode) = bot.control_mode {
                self.bot.control_mode = control_mode;
            }
            if let Some(api_base) = bot.api_base {
                self.bot.api_base = api_base;
            }
            if let Some(poll_timeout_secs) = bot.poll_timeout_secs {
                self.bot.poll_timeout_secs = poll_timeout_secs;
            }
            if let Some(request_timeout_secs) = bot.request_timeout_secs {
                self.bot.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("QABOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("QABOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("QABOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("QABOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("QABOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BOT_TOKEN") {
            self.bot.token = secret_value(value);
        }
        if let Some(value) = read_env("CHAT_ID") {
            self.bot.chat_id = parse_i64("CHAT_ID", &value)?;
        }
        if let Some(value) = read_env("UTILS_TOPIC_ID") {
            self.bot.topics.utils = parse_i64("UTILS_TOPIC_ID", &value)?;
        }
        if let Some(value) = read_env("QA_TOPIC_ID") {
            self.bot.topics.qa = parse_i64("QA_TOPIC_ID", &value)?;
        }
        if let Some(value) = read_env("NOTIFICATIONS_TOPIC_ID") {
            self.bot.topics.notifications = parse_i64("NOTIFICATIONS_TOPIC_ID", &value)?;
        }
        if let Some(value) = read_env("QABOT_CONTROL_MODE") {
            self.bot.control_mode = value.parse()?;
        }
        if let Some(value) = read_env("QABOT_API_BASE") {
            self.bot.api_base = value;
        }
        if let Some(value) = read_env("QABOT_POLL_TIMEOUT_SECS") {
            self.bot.poll_timeout_secs = parse_u64("QABOT_POLL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("QABOT_REQUEST_TIMEOUT_SECS") {
            self.bot.request_timeout_secs = parse_u64("QABOT_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QABOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QABOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("QABOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level = read_env("QABOT_LOGGING_LEVEL").or_else(|| read_env("QABOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("QABOT_LOGGING_FORMAT").or_else(|| read_env("QABOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.bot.token = secret_value(bot_token);
        }
        if let Some(chat_id) = overrides.chat_id {
            self.bot.chat_id = chat_id;
        }
        if let Some(utils_topic_id) = overrides.utils_topic_id {
            self.bot.topics.utils = utils_topic_id;
        }
        if let Some(qa_topic_id) = overrides.qa_topic_id {
            self.bot.topics.qa = qa_topic_id;
        }
        if let Some(notifications_topic_id) = overrides.notifications_topic_id {
            self.bot.topics.notifications = notifications_topic_id;
        }
        if let Some(control_mode) = overrides.control_mode {
            self.bot.control_mode = control_mode;
        }
        if let Some(api_base) = overrides.api_base {
            self.bot.api_base = api_base;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_bot(&self.bot)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("qabot.toml"), PathBuf::from("config/qabot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    let token = bot.token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::MissingRequired { key: "bot.token", env: "BOT_TOKEN" });
    }
    let well_formed = token
        .split_once(':')
        .map(|(bot_id, secret)| {
            !bot_id.is_empty() && bot_id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty()
        })
        .unwrap_or(false);
    if !well_formed {
        return Err(ConfigError::Validation(
            "bot.token must look like `<bot id>:<secret>`. Get it from @BotFather".to_string(),
        ));
    }

    if bot.chat_id == 0 {
        return Err(ConfigError::MissingRequired { key: "bot.chat_id", env: "CHAT_ID" });
    }
    if bot.topics.utils == 0 {
        return Err(ConfigError::MissingRequired {
            key: "bot.utils_topic_id",
            env: "UTILS_TOPIC_ID",
        });
    }
    if bot.topics.qa == 0 {
        return Err(ConfigError::MissingRequired { key: "bot.qa_topic_id", env: "QA_TOPIC_ID" });
    }
    if bot.topics.notifications == 0 {
        return Err(ConfigError::MissingRequired {
            key: "bot.notifications_topic_id",
            env: "NOTIFICATIONS_TOPIC_ID",
        });
    }
    if bot.topics.utils == bot.topics.qa {
        return Err(ConfigError::Validation(
            "bot.utils_topic_id and bot.qa_topic_id must name different topics".to_string(),
        ));
    }

    let api_base = bot.api_base.trim();
    if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "bot.api_base must start with http:// or https://".to_string(),
        ));
    }

    if bot.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "bot.poll_timeout_secs must be in range 0..=50".to_string(),
        ));
    }
    if bot.request_timeout_secs == 0 || bot.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "bot.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    bot: Option<BotPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    token: Option<String>,
    chat_id: Option<i64>,
    utils_topic_id: Option<i64>,
    qa_topic_id: Option<i64>,
    notifications_topic_id: Option<i64>,
    control_mode: Option<ControlMode>,
    api_base: Option<String>,
    poll_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, ControlMode, LoadOptions, LogFormat};

    const REQUIRED_VARS: &[&str] =
        &["BOT_TOKEN", "CHAT_ID", "UTILS_TOPIC_ID", "QA_TOPIC_ID", "NOTIFICATIONS_TOPIC_ID"];

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_required_vars() {
        env::set_var("BOT_TOKEN", "123456:test-secret");
        env::set_var("CHAT_ID", "-1001234567890");
        env::set_var("UTILS_TOPIC_ID", "11");
        env::set_var("QA_TOPIC_ID", "22");
        env::set_var("NOTIFICATIONS_TOPIC_ID", "33");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn required_identifiers_load_from_environment() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required_vars();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.bot.token.expose_secret() == "123456:test-secret", "token from env")?;
            ensure(config.bot.chat_id == -1_001_234_567_890, "chat id from env")?;
            ensure(config.bot.topics.utils == 11, "utils topic from env")?;
            ensure(config.bot.topics.qa == 22, "qa topic from env")?;
            ensure(config.bot.topics.notifications == 33, "notifications topic from env")?;
            ensure(config.bot.control_mode == ControlMode::Pinned, "pinned mode is the default")?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn missing_identifier_fails_fast_naming_the_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required_vars();
        env::remove_var("QA_TOPIC_ID");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected missing QA_TOPIC_ID to fail".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::MissingRequired { env: "QA_TOPIC_ID", .. }),
                "error should name QA_TOPIC_ID",
            )?;
            ensure(error.to_string().contains("QA_TOPIC_ID"), "message should mention env var")
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn non_numeric_identifier_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required_vars();
        env::set_var("CHAT_ID", "my-team-chat");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected malformed CHAT_ID to fail".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. } if key == "CHAT_ID"
                ),
                "malformed chat id should be reported as invalid env override",
            )
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_QABOT_TOKEN", "42:from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("qabot.toml");
            fs::write(
                &path,
                r#"
[bot]
token = "${TEST_QABOT_TOKEN}"
chat_id = -100500
utils_topic_id = 3
qa_topic_id = 5
notifications_topic_id = 7
control_mode = "ephemeral"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.bot.token.expose_secret() == "42:from-env", "token interpolated")?;
            ensure(config.bot.chat_id == -100_500, "chat id from file")?;
            ensure(config.bot.control_mode == ControlMode::Ephemeral, "mode from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_QABOT_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QABOT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("UTILS_TOPIC_ID", "101");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("qabot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[bot]
token = "1:file"
chat_id = -1
utils_topic_id = 1
qa_topic_id = 2
notifications_topic_id = 3

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.bot.topics.utils == 101, "env topic id should win over file")?;
            ensure(config.bot.topics.qa == 2, "file topic id should win over default")?;
            Ok(())
        })();

        clear_vars(&["QABOT_DATABASE_URL", "UTILS_TOPIC_ID"]);
        result
    }

    #[test]
    fn malformed_token_fails_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required_vars();
        env::set_var("BOT_TOKEN", "not-a-telegram-token");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("bot.token")
            );
            ensure(has_message, "validation failure should mention bot.token")
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn shared_utils_and_qa_topic_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required_vars();
        env::set_var("QA_TOPIC_ID", "11");

        let result = (|| -> Result<(), String> {
            let outcome = AppConfig::load(LoadOptions::default());
            ensure(
                matches!(outcome, Err(ConfigError::Validation(ref message)) if message.contains("different topics")),
                "utils and qa topics must differ",
            )
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required_vars();
        env::set_var("BOT_TOKEN", "999:very-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("very-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        result
    }
}
