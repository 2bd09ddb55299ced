use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BugId(pub i64);

impl std::fmt::Display for BugId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugStatus {
    Pending,
    Assigned,
}

impl BugStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
        }
    }
}

impl std::str::FromStr for BugStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            other => Err(DomainError::InvariantViolation(format!("unknown bug status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub id: i64,
    pub name: String,
}

/// A filed bug report.
///
/// `status` is `Assigned` exactly when `assignee` is present. The only legal
/// transition is `Pending -> Assigned`, performed once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugRecord {
    pub id: BugId,
    pub reporter_id: i64,
    pub reporter_name: String,
    pub assignee: Option<Assignee>,
    pub message_id: i64,
    pub status: BugStatus,
    pub created_at: DateTime<Utc>,
}

impl BugRecord {
    pub fn pending(
        id: BugId,
        reporter_id: i64,
        reporter_name: impl Into<String>,
        message_id: i64,
    ) -> Self {
        Self {
            id,
            reporter_id,
            reporter_name: reporter_name.into(),
            assignee: None,
            message_id,
            status: BugStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn assign(&mut self, assignee_id: i64, assignee_name: &str) -> Result<(), DomainError> {
        if self.status != BugStatus::Pending {
            return Err(DomainError::InvalidBugTransition {
                from: self.status,
                to: BugStatus::Assigned,
            });
        }

        self.assignee = Some(Assignee { id: assignee_id, name: assignee_name.to_owned() });
        self.status = BugStatus::Assigned;
        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        matches!(
            (self.status, &self.assignee),
            (BugStatus::Pending, None) | (BugStatus::Assigned, Some(_))
        )
    }
}
