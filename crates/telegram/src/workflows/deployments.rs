use tracing::{info, warn};

use qabot_core::config::ControlMode;
use qabot_core::domain::deployment::{Deployment, DeploymentKind};
use qabot_core::errors::{ContextField, InteractionError};

use super::{controls, persistence, DispatchCore};
use crate::commands::CallbackInvocation;
use crate::keyboards;
use crate::notify;

/// Records one deployment by the pressing user and announces it.
///
/// The row is committed before the notification goes out; a failed
/// notification is logged and leaves the row in place.
pub async fn record(
    core: &DispatchCore,
    kind: DeploymentKind,
    invocation: &CallbackInvocation,
) -> Result<Deployment, InteractionError> {
    let deployer =
        invocation.from.as_ref().ok_or(InteractionError::MissingContext(ContextField::Actor))?;

    let deployment = core
        .deployments
        .insert(kind, deployer.id, deployer.stored_name())
        .await
        .map_err(persistence)?;

    info!(
        event_name = "deployment.recorded",
        deployment_id = deployment.id.0,
        kind = kind.as_str(),
        deployer_id = deployer.id,
        "deployment recorded"
    );

    if let Err(error) = core.notifier.emit(&notify::deployment_alert(kind, deployer)).await {
        warn!(
            event_name = "notification.failed",
            deployment_id = deployment.id.0,
            error = %error,
            "deployment notification not delivered"
        );
    }

    if core.settings.control_mode == ControlMode::Ephemeral {
        if let Some(message_id) = invocation.message_id {
            let confirmation =
                keyboards::deployment_confirmation_message(&notify::mention(deployer), kind);
            if let Err(error) =
                controls::edit(core.api.as_ref(), core.settings.chat_id, message_id, &confirmation)
                    .await
            {
                warn!(
                    event_name = "control.edit_failed",
                    message_id,
                    error = %error,
                    "deployment confirmation not rendered"
                );
            }
        }
    }

    Ok(deployment)
}
