use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of embedded migrations that have not been applied yet.
pub async fn pending_count(pool: &DbPool) -> Result<usize, MigrateError> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied: Vec<i64> = if tracked == 0 {
        Vec::new()
    } else {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
    };

    Ok(MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .filter(|migration| !applied.contains(&migration.version))
        .count())
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{pending_count, run_pending, MIGRATOR};
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "deployments",
        "bugs",
        "idx_bugs_message_id",
        "idx_deployments_created_at",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("query sqlite_master")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_deployments_and_bugs() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert_eq!(pending_count(&pool).await.expect("pending before"), 1);

        run_pending(&pool).await.expect("run migrations");

        assert_eq!(table_count(&pool, "deployments").await, 1);
        assert_eq!(table_count(&pool, "bugs").await, 1);
        assert_eq!(pending_count(&pool).await.expect("pending after"), 0);
    }

    #[tokio::test]
    async fn schema_rejects_unknown_kinds_and_half_assigned_bugs() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let bad_kind = sqlx::query(
            "INSERT INTO deployments (type, deployer_id, deployer_name, created_at)
             VALUES ('mobile', 1, 'alice', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(bad_kind.is_err(), "type CHECK should reject unknown kinds");

        let half_assigned = sqlx::query(
            "INSERT INTO bugs (reporter_id, reporter_name, assigned_to_id, message_id, status, created_at)
             VALUES (1, 'alice', 2, 10, 'assigned', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(half_assigned.is_err(), "assigned bugs need both assignee fields");
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(initial_signature.len(), MANAGED_SCHEMA_OBJECTS.len());

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(managed_schema_signature(&pool).await.is_empty());

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(managed_schema_signature(&pool).await, initial_signature);
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            MANAGED_SCHEMA_OBJECTS
                .contains(&name.as_str())
                .then(|| (row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
        })
        .collect();
        signature.sort();
        signature
    }
}
