use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentKind {
    Ui,
    Backend,
}

impl DeploymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Backend => "backend",
        }
    }

    /// Human label used in notifications and callback answers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ui => "UI",
            Self::Backend => "Backend",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Ui => "🎨",
            Self::Backend => "⚙️",
        }
    }
}

impl std::str::FromStr for DeploymentKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ui" => Ok(Self::Ui),
            "backend" => Ok(Self::Backend),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown deployment kind `{other}`")))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub kind: DeploymentKind,
    pub deployer_id: i64,
    pub deployer_name: String,
    pub created_at: DateTime<Utc>,
}
