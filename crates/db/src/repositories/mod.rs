use async_trait::async_trait;
use thiserror::Error;

use qabot_core::domain::bug::{BugId, BugRecord};
use qabot_core::domain::deployment::{Deployment, DeploymentKind};

pub mod bug;
pub mod deployment;
pub mod memory;

pub use bug::SqlBugRepository;
pub use deployment::SqlDeploymentRepository;
pub use memory::{InMemoryBugRepository, InMemoryDeploymentRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

/// Append-only log of deployment announcements.
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn insert(
        &self,
        kind: DeploymentKind,
        deployer_id: i64,
        deployer_name: &str,
    ) -> Result<Deployment, RepositoryError>;

    /// Newest first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<Deployment>, RepositoryError>;
}

#[async_trait]
pub trait BugRepository: Send + Sync {
    /// Files a new `pending` bug keyed by the control message it came from.
    async fn insert(
        &self,
        reporter_id: i64,
        reporter_name: &str,
        message_id: i64,
    ) -> Result<BugRecord, RepositoryError>;

    /// Moves a pending bug to `assigned`. Fails with `NotFound` when no
    /// pending bug carries `id`, so a bug is assigned at most once.
    async fn assign(
        &self,
        id: BugId,
        assignee_id: i64,
        assignee_name: &str,
    ) -> Result<BugRecord, RepositoryError>;

    /// Most recently filed bug for `message_id`, whatever its status.
    async fn find_by_message_id(
        &self,
        message_id: i64,
    ) -> Result<Option<BugRecord>, RepositoryError>;

    async fn find_by_id(&self, id: BugId) -> Result<Option<BugRecord>, RepositoryError>;

    /// Removes a bug that is still `pending`. Assigned bugs are kept and
    /// reported as `NotFound`.
    async fn discard(&self, id: BugId) -> Result<(), RepositoryError>;
}
