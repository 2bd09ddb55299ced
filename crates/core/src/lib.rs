pub mod config;
pub mod domain;
pub mod errors;
pub mod topics;

pub use config::{AppConfig, ControlMode, LoadOptions};
pub use domain::bug::{Assignee, BugId, BugRecord, BugStatus};
pub use domain::deployment::{Deployment, DeploymentId, DeploymentKind};
pub use domain::member::Member;
pub use errors::{ApplicationError, ContextField, DomainError, InteractionError};
pub use topics::{Topic, TopicIds, TopicScope};
