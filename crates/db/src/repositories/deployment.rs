use chrono::{DateTime, Utc};
use sqlx::Row;

use qabot_core::domain::deployment::{Deployment, DeploymentId, DeploymentKind};

use super::{DeploymentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDeploymentRepository {
    pool: DbPool,
}

impl SqlDeploymentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_deployment(row: &sqlx::sqlite::SqliteRow) -> Result<Deployment, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind: String = row.try_get("type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deployer_id: i64 =
        row.try_get("deployer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deployer_name: String =
        row.try_get("deployer_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Deployment {
        id: DeploymentId(id),
        kind: kind
            .parse::<DeploymentKind>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        deployer_id,
        deployer_name,
        created_at: parse_timestamp(&created_at)?,
    })
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

#[async_trait::async_trait]
impl DeploymentRepository for SqlDeploymentRepository {
    async fn insert(
        &self,
        kind: DeploymentKind,
        deployer_id: i64,
        deployer_name: &str,
    ) -> Result<Deployment, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO deployments (type, deployer_id, deployer_name, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(deployer_id)
        .bind(deployer_name)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Deployment {
            id: DeploymentId(result.last_insert_rowid()),
            kind,
            deployer_id,
            deployer_name: deployer_name.to_owned(),
            created_at,
        })
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Deployment>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, type, deployer_id, deployer_name, created_at
             FROM deployments
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_deployment).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use qabot_core::domain::deployment::DeploymentKind;

    use super::SqlDeploymentRepository;
    use crate::repositories::DeploymentRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlDeploymentRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlDeploymentRepository::new(pool)
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let repo = setup().await;

        let first = repo.insert(DeploymentKind::Ui, 7, "alice").await.expect("insert ui");
        let second = repo.insert(DeploymentKind::Backend, 8, "bob").await.expect("insert backend");

        assert!(second.id.0 > first.id.0);
        assert_eq!(first.kind, DeploymentKind::Ui);
        assert_eq!(second.deployer_name, "bob");
    }

    #[tokio::test]
    async fn list_recent_returns_newest_first_and_honours_limit() {
        let repo = setup().await;
        for (kind, name) in [
            (DeploymentKind::Ui, "alice"),
            (DeploymentKind::Backend, "bob"),
            (DeploymentKind::Ui, "carol"),
        ] {
            repo.insert(kind, 1, name).await.expect("insert");
        }

        let recent = repo.list_recent(2).await.expect("list");

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].deployer_name, "carol");
        assert_eq!(recent[1].deployer_name, "bob");
    }
}
