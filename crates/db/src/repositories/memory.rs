use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use qabot_core::domain::bug::{BugId, BugRecord, BugStatus};
use qabot_core::domain::deployment::{Deployment, DeploymentId, DeploymentKind};

use super::{BugRepository, DeploymentRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryDeploymentRepository {
    deployments: RwLock<Vec<Deployment>>,
}

impl InMemoryDeploymentRepository {
    pub async fn all(&self) -> Vec<Deployment> {
        self.deployments.read().await.clone()
    }
}

#[async_trait::async_trait]
impl DeploymentRepository for InMemoryDeploymentRepository {
    async fn insert(
        &self,
        kind: DeploymentKind,
        deployer_id: i64,
        deployer_name: &str,
    ) -> Result<Deployment, RepositoryError> {
        let mut deployments = self.deployments.write().await;
        let deployment = Deployment {
            id: DeploymentId(deployments.len() as i64 + 1),
            kind,
            deployer_id,
            deployer_name: deployer_name.to_owned(),
            created_at: Utc::now(),
        };
        deployments.push(deployment.clone());
        Ok(deployment)
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Deployment>, RepositoryError> {
        let deployments = self.deployments.read().await;
        Ok(deployments.iter().rev().take(limit as usize).cloned().collect())
    }
}

/// Bugs keyed by id; ids are handed out in insertion order.
#[derive(Default)]
pub struct InMemoryBugRepository {
    bugs: RwLock<BTreeMap<i64, BugRecord>>,
}

impl InMemoryBugRepository {
    pub async fn all(&self) -> Vec<BugRecord> {
        self.bugs.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl BugRepository for InMemoryBugRepository {
    async fn insert(
        &self,
        reporter_id: i64,
        reporter_name: &str,
        message_id: i64,
    ) -> Result<BugRecord, RepositoryError> {
        let mut bugs = self.bugs.write().await;
        let next_id = bugs.keys().next_back().copied().unwrap_or(0) + 1;
        let bug = BugRecord::pending(BugId(next_id), reporter_id, reporter_name, message_id);
        bugs.insert(next_id, bug.clone());
        Ok(bug)
    }

    async fn assign(
        &self,
        id: BugId,
        assignee_id: i64,
        assignee_name: &str,
    ) -> Result<BugRecord, RepositoryError> {
        let mut bugs = self.bugs.write().await;
        let bug = bugs
            .get_mut(&id.0)
            .ok_or(RepositoryError::NotFound { entity: "pending bug", id: id.0 })?;
        bug.assign(assignee_id, assignee_name)
            .map_err(|_| RepositoryError::NotFound { entity: "pending bug", id: id.0 })?;
        Ok(bug.clone())
    }

    async fn find_by_message_id(
        &self,
        message_id: i64,
    ) -> Result<Option<BugRecord>, RepositoryError> {
        let bugs = self.bugs.read().await;
        Ok(bugs.values().rev().find(|bug| bug.message_id == message_id).cloned())
    }

    async fn find_by_id(&self, id: BugId) -> Result<Option<BugRecord>, RepositoryError> {
        let bugs = self.bugs.read().await;
        Ok(bugs.get(&id.0).cloned())
    }

    async fn discard(&self, id: BugId) -> Result<(), RepositoryError> {
        let mut bugs = self.bugs.write().await;
        match bugs.get(&id.0) {
            Some(bug) if bug.status == BugStatus::Pending => {
                bugs.remove(&id.0);
                Ok(())
            }
            _ => Err(RepositoryError::NotFound { entity: "pending bug", id: id.0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use qabot_core::domain::bug::BugStatus;
    use qabot_core::domain::deployment::DeploymentKind;

    use crate::repositories::{
        BugRepository, DeploymentRepository, InMemoryBugRepository, InMemoryDeploymentRepository,
        RepositoryError,
    };

    #[tokio::test]
    async fn in_memory_deployments_list_newest_first() {
        let repo = InMemoryDeploymentRepository::default();
        repo.insert(DeploymentKind::Ui, 1, "alice").await.expect("insert");
        repo.insert(DeploymentKind::Backend, 2, "bob").await.expect("insert");

        let recent = repo.list_recent(10).await.expect("list");

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, DeploymentKind::Backend);
        assert_eq!(recent[1].deployer_name, "alice");
    }

    #[tokio::test]
    async fn in_memory_bug_assignment_is_one_way() {
        let repo = InMemoryBugRepository::default();
        let bug = repo.insert(1, "alice", 50).await.expect("insert");

        let assigned = repo.assign(bug.id, 2, "bob").await.expect("assign");
        assert_eq!(assigned.status, BugStatus::Assigned);

        let error = repo.assign(bug.id, 3, "carol").await.expect_err("reassign");
        assert!(matches!(error, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn in_memory_message_lookup_prefers_latest() {
        let repo = InMemoryBugRepository::default();
        repo.insert(1, "alice", 50).await.expect("first");
        let latest = repo.insert(2, "bob", 50).await.expect("second");

        let found = repo.find_by_message_id(50).await.expect("lookup").expect("found");
        assert_eq!(found.id, latest.id);
    }

    #[tokio::test]
    async fn in_memory_discard_keeps_assigned_bugs() {
        let repo = InMemoryBugRepository::default();
        let pending = repo.insert(1, "alice", 50).await.expect("pending");
        let assigned = repo.insert(1, "alice", 51).await.expect("assigned");
        repo.assign(assigned.id, 2, "bob").await.expect("assign");

        repo.discard(pending.id).await.expect("discard");
        assert!(repo.discard(assigned.id).await.is_err());

        let remaining: Vec<_> = repo.all().await.into_iter().map(|bug| bug.id).collect();
        assert_eq!(remaining, vec![assigned.id]);
    }
}
