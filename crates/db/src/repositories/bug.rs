use chrono::Utc;
use sqlx::Row;

use qabot_core::domain::bug::{Assignee, BugId, BugRecord, BugStatus};

use super::deployment::parse_timestamp;
use super::{BugRepository, RepositoryError};
use crate::DbPool;

const BUG_COLUMNS: &str = "id, reporter_id, reporter_name, assigned_to_id, assigned_to_name, \
                           message_id, status, created_at";

pub struct SqlBugRepository {
    pool: DbPool,
}

impl SqlBugRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_bug(row: &sqlx::sqlite::SqliteRow) -> Result<BugRecord, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reporter_id: i64 =
        row.try_get("reporter_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reporter_name: String =
        row.try_get("reporter_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assigned_to_id: Option<i64> =
        row.try_get("assigned_to_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assigned_to_name: Option<String> =
        row.try_get("assigned_to_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message_id: i64 =
        row.try_get("message_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let assignee = match (assigned_to_id, assigned_to_name) {
        (Some(id), Some(name)) => Some(Assignee { id, name }),
        _ => None,
    };

    let bug = BugRecord {
        id: BugId(id),
        reporter_id,
        reporter_name,
        assignee,
        message_id,
        status: status.parse::<BugStatus>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        created_at: parse_timestamp(&created_at)?,
    };

    if !bug.is_consistent() {
        return Err(RepositoryError::Decode(format!(
            "bug {id} has status `{status}` but inconsistent assignee columns"
        )));
    }

    Ok(bug)
}

#[async_trait::async_trait]
impl BugRepository for SqlBugRepository {
    async fn insert(
        &self,
        reporter_id: i64,
        reporter_name: &str,
        message_id: i64,
    ) -> Result<BugRecord, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO bugs (reporter_id, reporter_name, message_id, status, created_at)
             VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(reporter_id)
        .bind(reporter_name)
        .bind(message_id)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = BugId(result.last_insert_rowid());
        let mut bug = BugRecord::pending(id, reporter_id, reporter_name, message_id);
        bug.created_at = created_at;
        Ok(bug)
    }

    async fn assign(
        &self,
        id: BugId,
        assignee_id: i64,
        assignee_name: &str,
    ) -> Result<BugRecord, RepositoryError> {
        let sql = format!(
            "UPDATE bugs
             SET assigned_to_id = ?, assigned_to_name = ?, status = 'assigned'
             WHERE id = ? AND status = 'pending'
             RETURNING {BUG_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(assignee_id)
            .bind(assignee_name)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => row_to_bug(r),
            None => Err(RepositoryError::NotFound { entity: "pending bug", id: id.0 }),
        }
    }

    async fn find_by_message_id(
        &self,
        message_id: i64,
    ) -> Result<Option<BugRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {BUG_COLUMNS} FROM bugs WHERE message_id = ? ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql).bind(message_id).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_bug(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: BugId) -> Result<Option<BugRecord>, RepositoryError> {
        let sql = format!("SELECT {BUG_COLUMNS} FROM bugs WHERE id = ?");
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_bug(r)?)),
            None => Ok(None),
        }
    }

    async fn discard(&self, id: BugId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bugs WHERE id = ? AND status = 'pending'")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "pending bug", id: id.0 });
        }
        Ok(())
    }
}
