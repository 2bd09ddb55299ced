use std::time::Duration;

use qabot_core::config::{AppConfig, LoadOptions};
use qabot_db::{connect_with_settings, migrations, ping};
use qabot_telegram::api::{BotApi, HttpBotApi};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::commands::{runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                format!(
                    "chat {} with topics utils={} qa={} notifications={} ({:?} controls)",
                    config.bot.chat_id,
                    config.bot.topics.utils,
                    config.bot.topics.qa,
                    config.bot.topics.notifications,
                    config.bot.control_mode
                ),
            ));
            match runtime("doctor") {
                Ok(runtime) => {
                    checks.extend(runtime.block_on(check_database(&config)));
                    checks.push(runtime.block_on(check_bot_identity(&config)));
                }
                Err(_) => {
                    checks.push(DoctorCheck::fail(
                        "database_connectivity",
                        "failed to initialize async runtime",
                    ));
                    checks.push(DoctorCheck::skipped("schema_migrations", "no async runtime"));
                    checks.push(DoctorCheck::skipped("bot_identity", "no async runtime"));
                }
            }
        }
        Err(error) => {
            let reason = "configuration did not load";
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("database_connectivity", reason));
            checks.push(DoctorCheck::skipped("schema_migrations", reason));
            checks.push(DoctorCheck::skipped("bot_identity", reason));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

async fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let pool = match connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    {
        Ok(pool) => pool,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to connect to database: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
            ];
        }
    };

    let connectivity = match ping(&pool).await {
        Ok(()) => DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        ),
        Err(error) => {
            DoctorCheck::fail("database_connectivity", format!("database query failed: {error}"))
        }
    };
    let schema = match migrations::pending_count(&pool).await {
        Ok(0) => DoctorCheck::pass("schema_migrations", "schema is up to date"),
        Ok(pending) => DoctorCheck::fail(
            "schema_migrations",
            format!("{pending} pending migration(s); run `qabot migrate`"),
        ),
        Err(error) => {
            DoctorCheck::fail("schema_migrations", format!("could not inspect migrations: {error}"))
        }
    };

    pool.close().await;
    vec![connectivity, schema]
}

async fn check_bot_identity(config: &AppConfig) -> DoctorCheck {
    let api = match HttpBotApi::new(
        &config.bot.api_base,
        SecretString::from(config.bot.token.expose_secret().to_owned()),
        Duration::from_secs(config.bot.request_timeout_secs),
    ) {
        Ok(api) => api,
        Err(error) => return DoctorCheck::fail("bot_identity", error.to_string()),
    };

    match api.get_me().await {
        Ok(me) => DoctorCheck::pass(
            "bot_identity",
            format!("token accepted for @{}", me.username.as_deref().unwrap_or("unknown")),
        ),
        Err(error) => DoctorCheck::fail("bot_identity", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
