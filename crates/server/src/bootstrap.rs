use std::sync::Arc;
use std::time::Duration;

use qabot_core::config::{AppConfig, ConfigError, LoadOptions};
use qabot_db::{
    connect_with_settings, migrations, DbPool, SqlBugRepository, SqlDeploymentRepository,
};
use qabot_telegram::api::{ApiError, BotApi, HttpBotApi};
use qabot_telegram::events::bot_dispatcher;
use qabot_telegram::membership::ApiMembershipResolver;
use qabot_telegram::polling::{LongPollTransport, PollingRunner, ReconnectPolicy};
use qabot_telegram::workflows::{DispatchCore, DispatchSettings};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub bot_username: Option<String>,
    pub runner: PollingRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("bot api client could not be built: {0}")]
    BotClient(#[source] ApiError),
    #[error("bot identity check failed: {0}")]
    BotIdentity(#[source] ApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = open_store(&config).await?;
    let api = HttpBotApi::new(
        &config.bot.api_base,
        SecretString::from(config.bot.token.expose_secret().to_owned()),
        Duration::from_secs(config.bot.request_timeout_secs),
    )
    .map_err(BootstrapError::BotClient)?;

    assemble(config, db_pool, Arc::new(api), ReconnectPolicy::default()).await
}

pub async fn open_store(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(db_pool)
}

/// Wires the dispatch core and receive loop around an already open store.
pub async fn assemble(
    config: AppConfig,
    db_pool: DbPool,
    api: Arc<dyn BotApi>,
    reconnect_policy: ReconnectPolicy,
) -> Result<Application, BootstrapError> {
    let me = api.get_me().await.map_err(BootstrapError::BotIdentity)?;
    info!(
        event_name = "system.bootstrap.bot_identified",
        correlation_id = "bootstrap",
        bot_id = me.id,
        bot_username = me.username.as_deref().unwrap_or("unknown"),
        control_mode = ?config.bot.control_mode,
        "bot identity confirmed"
    );

    let core = DispatchCore::new(
        api.clone(),
        Arc::new(SqlDeploymentRepository::new(db_pool.clone())),
        Arc::new(SqlBugRepository::new(db_pool.clone())),
        Arc::new(ApiMembershipResolver::new(api.clone())),
        DispatchSettings {
            chat_id: config.bot.chat_id,
            topics: config.bot.topics,
            control_mode: config.bot.control_mode,
        },
    );
    let dispatcher = bot_dispatcher(core, me.username.clone());
    let transport = Arc::new(LongPollTransport::new(api, config.bot.poll_timeout_secs));
    let runner = PollingRunner::new(transport, dispatcher, reconnect_policy);

    Ok(Application { config, db_pool, bot_username: me.username, runner })
}
