mod bootstrap;
mod health;

use std::process::ExitCode;

use anyhow::Result;
use qabot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use qabot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

/// A panic anywhere in the process is fatal; a supervisor restarts the bot.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(
            event_name = "system.server.panic",
            correlation_id = "runtime",
            panic = %info,
            "unrecoverable panic"
        );
        eprintln!("qabot-server panicked: {info}");
        std::process::exit(1);
    }));
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(
                event_name = "system.server.failed",
                correlation_id = "runtime",
                error = %error,
                "qabot-server terminated"
            );
            eprintln!("qabot-server: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);
    install_panic_hook();

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.bot_username.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        chat_id = app.config.bot.chat_id,
        control_mode = ?app.config.bot.control_mode,
        "qabot-server started"
    );

    let db_pool = app.db_pool.clone();
    let outcome = tokio::select! {
        result = app.runner.start() => result.map_err(anyhow::Error::from),
        signal = wait_for_shutdown() => signal,
    };

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "qabot-server stopping"
    );
    db_pool.close().await;

    outcome
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
