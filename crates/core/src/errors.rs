use thiserror::Error;

use crate::domain::bug::{BugId, BugStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid bug transition from {from:?} to {to:?}")]
    InvalidBugTransition { from: BugStatus, to: BugStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

/// Piece of a button press the interaction could not do without.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextField {
    /// The user who pressed a deployment button.
    Actor,
    /// The user who pressed an assignee button.
    Reporter,
    /// The user filing a bug.
    FilingDetails,
    /// The message the button sits on.
    OriginMessage,
}

impl ContextField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actor => "user",
            Self::Reporter => "reporter",
            Self::FilingDetails => "reporter details",
            Self::OriginMessage => "origin message",
        }
    }
}

impl std::fmt::Display for ContextField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of a single button interaction. Each one is reported back to the
/// user as a short callback answer and never escapes the handler.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InteractionError {
    #[error("interaction is missing {0}")]
    MissingContext(ContextField),
    #[error("no assignable team members in chat")]
    NoMembers,
    #[error("no bug was filed from message {message_id}")]
    BugNotFound { message_id: i64 },
    #[error("selection for bug {selected} is stale; message now tracks bug {current}")]
    StaleSelection { selected: BugId, current: BugId },
    #[error("assignee {assignee_id} is not a member of the chat")]
    AssigneeNotFound { assignee_id: i64 },
    #[error("assignment button names ids out of range")]
    UnreadableSelection,
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl InteractionError {
    /// Short text shown in the callback answer. `fallback` covers failures
    /// that are not the user's doing.
    pub fn user_message(&self, fallback: &'static str) -> &'static str {
        match self {
            Self::MissingContext(ContextField::Actor) => "Error: User information not available",
            Self::MissingContext(ContextField::Reporter) => {
                "Error: Reporter information not available"
            }
            Self::MissingContext(ContextField::FilingDetails | ContextField::OriginMessage) => {
                "Error: Missing information"
            }
            Self::NoMembers => "No team members found",
            Self::BugNotFound { .. }
            | Self::StaleSelection { .. }
            | Self::UnreadableSelection => "Error: Bug not found",
            Self::AssigneeNotFound { .. } => "Error: Assignee not found",
            Self::Application(_) => fallback,
        }
    }
}

impl From<DomainError> for InteractionError {
    fn from(value: DomainError) -> Self {
        Self::Application(ApplicationError::Domain(value))
    }
}
