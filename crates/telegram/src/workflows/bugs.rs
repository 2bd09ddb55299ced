use tracing::{info, warn};

use qabot_core::config::ControlMode;
use qabot_core::domain::bug::{BugId, BugRecord, BugStatus};
use qabot_core::domain::member::Member;
use qabot_core::errors::{ApplicationError, ContextField, InteractionError};
use qabot_db::RepositoryError;

use super::{controls, integration, persistence, DispatchCore};
use crate::commands::CallbackInvocation;
use crate::keyboards;
use crate::notify;

/// Files a pending bug from the pressed control message and turns that
/// message into the assignee picker.
///
/// Membership is resolved before anything is written, so an empty or
/// unavailable member list leaves no bug behind. The picker needs the new
/// bug id, so the row is written first and discarded again when the picker
/// cannot be shown.
pub async fn file(
    core: &DispatchCore,
    invocation: &CallbackInvocation,
) -> Result<BugRecord, InteractionError> {
    let reporter = invocation
        .from
        .as_ref()
        .ok_or(InteractionError::MissingContext(ContextField::FilingDetails))?;
    let message_id = invocation
        .message_id
        .ok_or(InteractionError::MissingContext(ContextField::OriginMessage))?;

    let members = assignable_members(core).await?;
    if members.is_empty() {
        return Err(InteractionError::NoMembers);
    }

    let bug = core
        .bugs
        .insert(reporter.id, reporter.stored_name(), message_id)
        .await
        .map_err(persistence)?;

    let picker = keyboards::assignee_selection_message(bug.id, &members);
    let shown = controls::edit_tracked(
        core.api.as_ref(),
        core.settings.chat_id,
        message_id,
        &core.qa_control,
        &picker,
    )
    .await;
    if let Err(error) = shown {
        if let Err(discard_error) = core.bugs.discard(bug.id).await {
            warn!(
                event_name = "bug.discard_failed",
                bug_id = bug.id.0,
                error = %discard_error,
                "pending bug left behind after picker failure"
            );
        }
        return Err(integration(error));
    }

    info!(
        event_name = "bug.filed",
        bug_id = bug.id.0,
        reporter_id = reporter.id,
        message_id,
        candidates = members.len(),
        "bug filed"
    );

    Ok(bug)
}

/// Assigns the bug filed from the pressed message.
///
/// The bug is looked up by the message the button sits on. The id carried
/// in the button must name that same pending bug; anything else is a stale
/// picker and is reported as not found.
pub async fn assign(
    core: &DispatchCore,
    bug_id: BugId,
    assignee_id: i64,
    invocation: &CallbackInvocation,
) -> Result<BugRecord, InteractionError> {
    let actor =
        invocation.from.as_ref().ok_or(InteractionError::MissingContext(ContextField::Reporter))?;
    let message_id = invocation
        .message_id
        .ok_or(InteractionError::MissingContext(ContextField::OriginMessage))?;

    let bug = core
        .bugs
        .find_by_message_id(message_id)
        .await
        .map_err(persistence)?
        .ok_or(InteractionError::BugNotFound { message_id })?;
    if bug.id != bug_id || bug.status != BugStatus::Pending {
        return Err(InteractionError::StaleSelection { selected: bug_id, current: bug.id });
    }

    let assignee = assignable_members(core)
        .await?
        .into_iter()
        .find(|member| member.id == assignee_id)
        .ok_or(InteractionError::AssigneeNotFound { assignee_id })?;

    let assigned = core
        .bugs
        .assign(bug.id, assignee.id, assignee.stored_name())
        .await
        .map_err(|error| match error {
            RepositoryError::NotFound { .. } => InteractionError::BugNotFound { message_id },
            other => persistence(other),
        })?;

    info!(
        event_name = "bug.assigned",
        bug_id = assigned.id.0,
        reporter_id = assigned.reporter_id,
        assignee_id = assignee.id,
        "bug assigned"
    );

    let reporter_mention = reporter_mention(&assigned, actor);
    let assignee_mention = notify::mention(&assignee);
    let alert = notify::bug_assignment_alert(&reporter_mention, &assignee_mention);
    if let Err(error) = core.notifier.emit(&alert).await {
        warn!(
            event_name = "notification.failed",
            bug_id = assigned.id.0,
            error = %error,
            "assignment notification not delivered"
        );
    }

    let restored = match core.settings.control_mode {
        ControlMode::Pinned => {
            controls::edit_tracked(
                core.api.as_ref(),
                core.settings.chat_id,
                message_id,
                &core.qa_control,
                &keyboards::bug_filing_control_message(),
            )
            .await
        }
        ControlMode::Ephemeral => {
            let summary =
                keyboards::assignment_completed_message(&reporter_mention, &assignee_mention);
            controls::edit(core.api.as_ref(), core.settings.chat_id, message_id, &summary).await
        }
    };
    if let Err(error) = restored {
        warn!(
            event_name = "control.edit_failed",
            message_id,
            error = %error,
            "control message not restored after assignment"
        );
    }

    Ok(assigned)
}

async fn assignable_members(core: &DispatchCore) -> Result<Vec<Member>, InteractionError> {
    core.membership
        .list_human_members(core.settings.chat_id)
        .await
        .map_err(|error| ApplicationError::Integration(error.to_string()).into())
}

/// The presser's own profile when they filed the bug, otherwise a link built
/// from the stored reporter fields.
fn reporter_mention(bug: &BugRecord, actor: &Member) -> String {
    if actor.id == bug.reporter_id {
        notify::mention(actor)
    } else {
        notify::mention_parts(bug.reporter_id, &bug.reporter_name, None)
    }
}
