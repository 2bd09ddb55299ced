use qabot_core::domain::deployment::Deployment;
use qabot_db::{connect_with_settings, migrations, DeploymentRepository, SqlDeploymentRepository};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run(limit: u32) -> CommandResult {
    let config = match load_config("deployments") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("deployments") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let rows = SqlDeploymentRepository::new(pool.clone())
            .list_recent(limit)
            .await
            .map_err(|error| ("persistence", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<Vec<Deployment>, (&'static str, String, u8)>(rows)
    });

    match result {
        Ok(rows) if rows.is_empty() => {
            CommandResult::success("deployments", "no deployments recorded yet")
        }
        Ok(rows) => CommandResult::success("deployments", render(&rows)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("deployments", error_class, message, exit_code)
        }
    }
}

fn render(rows: &[Deployment]) -> String {
    let mut lines = vec![format!("{} most recent deployment(s):", rows.len())];
    lines.extend(rows.iter().map(|row| {
        format!(
            "  - #{} {} by {} ({}) at {}",
            row.id.0,
            row.kind.label(),
            row.deployer_name,
            row.deployer_id,
            row.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }));
    lines.join("\n")
}
