use std::sync::Arc;

use tracing::info;

use qabot_core::domain::deployment::DeploymentKind;
use qabot_core::domain::member::Member;
use qabot_core::topics::TopicScope;

use crate::api::{ApiError, BotApi, SendMessage};
use crate::keyboards::MessageBuilder;

/// Posts one Markdown message per completed action into the notifications
/// topic.
#[derive(Clone)]
pub struct NotificationEmitter {
    api: Arc<dyn BotApi>,
    chat_id: i64,
    scope: TopicScope,
}

impl NotificationEmitter {
    pub fn new(api: Arc<dyn BotApi>, chat_id: i64, scope: TopicScope) -> Self {
        Self { api, chat_id, scope }
    }

    pub async fn emit(&self, text: &str) -> Result<i64, ApiError> {
        let template = MessageBuilder::new(text).markdown().build();
        let request =
            SendMessage::new(self.chat_id, &template).in_thread(Some(self.scope.thread_id));
        let message = self.api.send_message(request).await?;

        info!(
            event_name = "notification.sent",
            topic = self.scope.topic.as_str(),
            message_id = message.message_id,
            "notification posted"
        );
        Ok(message.message_id)
    }
}

/// `@username` when known, otherwise an inline link to the user id.
pub fn mention(member: &Member) -> String {
    mention_parts(member.id, &member.first_name, member.username.as_deref())
}

pub fn mention_parts(id: i64, first_name: &str, username: Option<&str>) -> String {
    match username {
        Some(username) => format!("@{}", escape_markdown(username)),
        None => format!("[{first_name}](tg://user?id={id})"),
    }
}

pub fn deployment_alert(kind: DeploymentKind, deployer: &Member) -> String {
    format!(
        "🚀 {emoji} *Deployment Alert*\n\n{who} deployed {label} to IFT",
        emoji = kind.emoji(),
        who = mention(deployer),
        label = kind.label()
    )
}

pub fn bug_assignment_alert(reporter_mention: &str, assignee_mention: &str) -> String {
    format!("*Bug Assignment*\n\n{reporter_mention} filed bugs assigned to {assignee_mention}")
}

/// Usernames may contain `_`, which legacy Markdown reads as italics.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use qabot_core::domain::deployment::DeploymentKind;
    use qabot_core::domain::member::Member;
    use qabot_core::topics::{Topic, TopicScope};

    use super::{bug_assignment_alert, deployment_alert, mention, NotificationEmitter};
    use crate::keyboards::ParseMode;
    use crate::testing::RecordingBotApi;

    #[test]
    fn mention_prefers_username_and_falls_back_to_link() {
        assert_eq!(mention(&Member::new(1, "Alice").with_username("alice")), "@alice");
        assert_eq!(mention(&Member::new(2, "Bob")), "[Bob](tg://user?id=2)");
        assert_eq!(mention(&Member::new(3, "Cy").with_username("cy_dev")), "@cy\\_dev");
    }

    #[test]
    fn deployment_alert_wording() {
        let alice = Member::new(1, "Alice").with_username("alice");
        assert_eq!(
            deployment_alert(DeploymentKind::Ui, &alice),
            "🚀 🎨 *Deployment Alert*\n\n@alice deployed UI to IFT"
        );
        assert!(deployment_alert(DeploymentKind::Backend, &alice).contains("⚙️"));
    }

    #[test]
    fn assignment_alert_wording() {
        assert_eq!(
            bug_assignment_alert("@bob", "@carol"),
            "*Bug Assignment*\n\n@bob filed bugs assigned to @carol"
        );
    }

    #[tokio::test]
    async fn emit_targets_notifications_thread() {
        let api = Arc::new(RecordingBotApi::default());
        let emitter =
            NotificationEmitter::new(api.clone(), -100, TopicScope::new(Topic::Notifications, 30));

        emitter.emit("*hello*").await.expect("emit");

        let sent = api.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_thread_id, Some(30));
        assert_eq!(sent[0].parse_mode, Some(ParseMode::Markdown));
        assert!(sent[0].reply_markup.is_none());
    }
}
