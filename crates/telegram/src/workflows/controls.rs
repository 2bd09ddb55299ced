use tokio::sync::Mutex;
use tracing::warn;

use qabot_core::config::ControlMode;
use qabot_core::topics::TopicScope;

use crate::api::{ApiError, BotApi, EditMessageText, SendMessage};
use crate::keyboards::MessageTemplate;

/// The message carrying a topic's live buttons. Empty at startup and after
/// an edit against it fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PinnedMessage {
    message_id: Option<i64>,
}

impl PinnedMessage {
    pub fn message_id(&self) -> Option<i64> {
        self.message_id
    }

    pub fn set(&mut self, message_id: i64) {
        self.message_id = Some(message_id);
    }

    pub fn clear(&mut self) {
        self.message_id = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The tracked message was re-rendered in place.
    Edited { message_id: i64 },
    Created { message_id: i64, pinned: bool },
}

impl ControlOutcome {
    pub fn message_id(&self) -> i64 {
        match self {
            Self::Edited { message_id } | Self::Created { message_id, .. } => *message_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edited { .. } => "edited",
            Self::Created { pinned: true, .. } => "created_pinned",
            Self::Created { pinned: false, .. } => "created",
        }
    }
}

/// Renders `template` as the control message of `scope`.
///
/// In pinned mode the tracked message is edited when one exists; a failed
/// edit clears the cell and a new message is sent, recorded and pinned. The
/// cell stays locked for the whole transition. Ephemeral mode always sends
/// a fresh, untracked message.
pub async fn show(
    api: &dyn BotApi,
    chat_id: i64,
    scope: TopicScope,
    mode: ControlMode,
    cell: &Mutex<PinnedMessage>,
    template: &MessageTemplate,
) -> Result<ControlOutcome, ApiError> {
    if mode == ControlMode::Ephemeral {
        let message = api
            .send_message(SendMessage::new(chat_id, template).in_thread(Some(scope.thread_id)))
            .await?;
        return Ok(ControlOutcome::Created { message_id: message.message_id, pinned: false });
    }

    let mut pinned = cell.lock().await;
    if let Some(message_id) = pinned.message_id() {
        match edit(api, chat_id, message_id, template).await {
            Ok(()) => return Ok(ControlOutcome::Edited { message_id }),
            Err(error) => {
                warn!(
                    event_name = "control.edit_failed",
                    topic = scope.topic.as_str(),
                    message_id,
                    error = %error,
                    "tracked control message could not be edited; recreating"
                );
                pinned.clear();
            }
        }
    }

    let message = api
        .send_message(SendMessage::new(chat_id, template).in_thread(Some(scope.thread_id)))
        .await?;
    pinned.set(message.message_id);

    let pinned_ok = match api.pin_chat_message(chat_id, message.message_id).await {
        Ok(()) => true,
        Err(error) => {
            warn!(
                event_name = "control.pin_failed",
                topic = scope.topic.as_str(),
                message_id = message.message_id,
                error = %error,
                "control message sent but not pinned"
            );
            false
        }
    };

    Ok(ControlOutcome::Created { message_id: message.message_id, pinned: pinned_ok })
}

/// Edits `template` onto the message a button was pressed on. Clears the
/// cell if that message is the tracked one and the edit fails.
pub async fn edit_tracked(
    api: &dyn BotApi,
    chat_id: i64,
    message_id: i64,
    cell: &Mutex<PinnedMessage>,
    template: &MessageTemplate,
) -> Result<(), ApiError> {
    let mut pinned = cell.lock().await;
    match edit(api, chat_id, message_id, template).await {
        Ok(()) => Ok(()),
        Err(error) => {
            if pinned.message_id() == Some(message_id) {
                pinned.clear();
            }
            Err(error)
        }
    }
}

/// An unchanged message still shows the intended buttons.
pub async fn edit(
    api: &dyn BotApi,
    chat_id: i64,
    message_id: i64,
    template: &MessageTemplate,
) -> Result<(), ApiError> {
    match api.edit_message_text(EditMessageText::new(chat_id, message_id, template)).await {
        Err(error) if error.is_not_modified() => Ok(()),
        result => result,
    }
}
