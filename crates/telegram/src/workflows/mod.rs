//! Topic-scoped transitions behind the command and callback routers.
//!
//! [`DispatchCore`] owns one pinned-message cell per control topic and hands
//! it to the transition functions in [`controls`]. The deployment and bug
//! workflows live in [`deployments`] and [`bugs`]; neither touches the
//! other's state, and both report through the shared [`NotificationEmitter`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use qabot_core::config::ControlMode;
use qabot_core::domain::bug::BugId;
use qabot_core::domain::deployment::DeploymentKind;
use qabot_core::errors::{ApplicationError, InteractionError};
use qabot_core::topics::{Topic, TopicIds, TopicScope};
use qabot_db::{BugRepository, DeploymentRepository, RepositoryError};

use crate::api::{ApiError, BotApi, SendMessage};
use crate::commands::{
    CallbackInvocation, CommandInvocation, CommandRouteError, ControlService, InteractionService,
};
use crate::events::HandlerResult;
use crate::keyboards::{self, MessageTemplate};
use crate::membership::MembershipResolver;
use crate::notify::NotificationEmitter;

pub mod bugs;
pub mod controls;
pub mod deployments;

pub use controls::{ControlOutcome, PinnedMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    pub chat_id: i64,
    pub topics: TopicIds,
    pub control_mode: ControlMode,
}

#[derive(Clone)]
pub struct DispatchCore {
    api: Arc<dyn BotApi>,
    deployments: Arc<dyn DeploymentRepository>,
    bugs: Arc<dyn BugRepository>,
    membership: Arc<dyn MembershipResolver>,
    notifier: NotificationEmitter,
    settings: DispatchSettings,
    utils_control: Arc<Mutex<PinnedMessage>>,
    qa_control: Arc<Mutex<PinnedMessage>>,
}

impl DispatchCore {
    pub fn new(
        api: Arc<dyn BotApi>,
        deployments: Arc<dyn DeploymentRepository>,
        bugs: Arc<dyn BugRepository>,
        membership: Arc<dyn MembershipResolver>,
        settings: DispatchSettings,
    ) -> Self {
        let notifier = NotificationEmitter::new(
            api.clone(),
            settings.chat_id,
            settings.topics.scope(Topic::Notifications),
        );

        Self {
            api,
            deployments,
            bugs,
            membership,
            notifier,
            settings,
            utils_control: Arc::new(Mutex::new(PinnedMessage::default())),
            qa_control: Arc::new(Mutex::new(PinnedMessage::default())),
        }
    }

    /// Message currently carrying the buttons of `topic`, if one is tracked.
    pub async fn pinned_message(&self, topic: Topic) -> Option<i64> {
        match self.control_cell(topic) {
            Some(cell) => cell.lock().await.message_id(),
            None => None,
        }
    }

    fn control_cell(&self, topic: Topic) -> Option<&Mutex<PinnedMessage>> {
        match topic {
            Topic::Utils => Some(&self.utils_control),
            Topic::Qa => Some(&self.qa_control),
            Topic::Notifications => None,
        }
    }

    fn scope(&self, topic: Topic) -> TopicScope {
        self.settings.topics.scope(topic)
    }

    fn in_scope(&self, topic: Topic, chat_id: Option<i64>, thread_id: Option<i64>) -> bool {
        chat_id == Some(self.settings.chat_id) && self.scope(topic).matches(thread_id)
    }

    async fn answer(
        &self,
        invocation: &CallbackInvocation,
        text: &str,
    ) -> Result<HandlerResult, CommandRouteError> {
        self.api
            .answer_callback_query(&invocation.callback_id, Some(text))
            .await
            .map_err(|error| CommandRouteError::Service(error.to_string()))?;
        Ok(HandlerResult::Answered(text.to_owned()))
    }

    /// Answers with `success` or the user-facing form of the failure.
    async fn settle<T>(
        &self,
        invocation: &CallbackInvocation,
        action: &'static str,
        outcome: Result<T, InteractionError>,
        success: &str,
        fallback: &'static str,
    ) -> Result<HandlerResult, CommandRouteError> {
        match outcome {
            Ok(_) => self.answer(invocation, success).await,
            Err(error) => {
                warn!(
                    event_name = "interaction.failed",
                    action,
                    callback_id = %invocation.callback_id,
                    error = %error,
                    "button interaction failed"
                );
                self.answer(invocation, error.user_message(fallback)).await
            }
        }
    }
}

#[async_trait]
impl ControlService for DispatchCore {
    async fn show_controls(
        &self,
        topic: Topic,
        invocation: &CommandInvocation,
    ) -> Result<HandlerResult, CommandRouteError> {
        if !self.in_scope(topic, Some(invocation.chat_id), invocation.thread_id) {
            debug!(
                event_name = "control.out_of_scope",
                topic = topic.as_str(),
                command = invocation.command.name(),
                thread_id = ?invocation.thread_id,
                "command ignored outside its topic"
            );
            return Ok(HandlerResult::Ignored);
        }

        let template = match topic {
            Topic::Utils => keyboards::deployment_control_message(),
            Topic::Qa => keyboards::bug_filing_control_message(),
            Topic::Notifications => return Ok(HandlerResult::Ignored),
        };
        let Some(cell) = self.control_cell(topic) else {
            return Ok(HandlerResult::Ignored);
        };

        let outcome = controls::show(
            self.api.as_ref(),
            self.settings.chat_id,
            self.scope(topic),
            self.settings.control_mode,
            cell,
            &template,
        )
        .await
        .map_err(|error| CommandRouteError::Service(error.to_string()))?;

        info!(
            event_name = "control.shown",
            topic = topic.as_str(),
            command = invocation.command.name(),
            message_id = outcome.message_id(),
            outcome = outcome.as_str(),
            "control message shown"
        );
        Ok(HandlerResult::Responded(template))
    }

    async fn reply(
        &self,
        invocation: &CommandInvocation,
        message: MessageTemplate,
    ) -> Result<HandlerResult, CommandRouteError> {
        let request =
            SendMessage::new(invocation.chat_id, &message).in_thread(invocation.thread_id);
        self.api
            .send_message(request)
            .await
            .map_err(|error| CommandRouteError::Service(error.to_string()))?;

        debug!(
            event_name = "command.replied",
            command = invocation.command.name(),
            chat_id = invocation.chat_id,
            thread_id = ?invocation.thread_id,
            "static reply sent"
        );
        Ok(HandlerResult::Responded(message))
    }
}

#[async_trait]
impl InteractionService for DispatchCore {
    async fn record_deployment(
        &self,
        kind: DeploymentKind,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError> {
        if !self.in_scope(Topic::Utils, invocation.chat_id, invocation.thread_id) {
            return Ok(HandlerResult::Ignored);
        }

        let outcome = deployments::record(self, kind, invocation).await;
        let success = format!("✅ {} deployment recorded!", kind.label());
        self.settle(invocation, "deploy", outcome, &success, "Error recording deployment").await
    }

    async fn file_bug(
        &self,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError> {
        if !self.in_scope(Topic::Qa, invocation.chat_id, invocation.thread_id) {
            return Ok(HandlerResult::Ignored);
        }

        let outcome = bugs::file(self, invocation).await;
        self.settle(
            invocation,
            "file_bug",
            outcome,
            "Select team member to assign bugs",
            "Error processing request",
        )
        .await
    }

    async fn assign_bug(
        &self,
        bug_id: BugId,
        assignee_id: i64,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError> {
        if !self.in_scope(Topic::Qa, invocation.chat_id, invocation.thread_id) {
            return Ok(HandlerResult::Ignored);
        }

        let outcome = bugs::assign(self, bug_id, assignee_id, invocation).await;
        self.settle(
            invocation,
            "assign_bug",
            outcome,
            "Bug assigned successfully!",
            "Error assigning bug",
        )
        .await
    }

    async fn reject_selection(
        &self,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError> {
        if !self.in_scope(Topic::Qa, invocation.chat_id, invocation.thread_id) {
            return Ok(HandlerResult::Ignored);
        }

        let outcome: Result<(), _> = Err(InteractionError::UnreadableSelection);
        self.settle(invocation, "assign_bug", outcome, "", "Error assigning bug").await
    }
}

fn persistence(error: RepositoryError) -> InteractionError {
    ApplicationError::Persistence(error.to_string()).into()
}

fn integration(error: ApiError) -> InteractionError {
    ApplicationError::Integration(error.to_string()).into()
}


#[cfg(test)]
mod tests {
    use qabot_core::config::ControlMode;
    use qabot_core::topics::Topic;

    use super::test_support::{command, harness, TOPICS};
    use crate::commands::{BotCommand, ControlService};
    use crate::events::HandlerResult;
    use crate::keyboards;
    use crate::testing::StaticMembership;

    #[tokio::test]
    async fn commands_outside_their_topic_have_no_side_effects() {
        let h = harness(ControlMode::Pinned, StaticMembership::new(Vec::new()));

        for (cmd, thread) in [
            (BotCommand::Deploy, Some(TOPICS.qa)),
            (BotCommand::Start, None),
            (BotCommand::Bugs, Some(TOPICS.utils)),
            (BotCommand::SetupQa, Some(TOPICS.notifications)),
        ] {
            let topic = cmd.topic().expect("topic command");
            let result = h.core.show_controls(topic, &command(cmd, thread)).await.expect("show");
            assert_eq!(result, HandlerResult::Ignored);
        }

        assert_eq!(h.api.side_effect_count().await, 0);
        assert_eq!(h.core.pinned_message(Topic::Utils).await, None);
        assert_eq!(h.core.pinned_message(Topic::Qa).await, None);
    }

    #[tokio::test]
    async fn commands_from_another_chat_are_ignored() {
        let h = harness(ControlMode::Pinned, StaticMembership::new(Vec::new()));
        let mut invocation = command(BotCommand::Deploy, Some(TOPICS.utils));
        invocation.chat_id = -42;

        let result = h.core.show_controls(Topic::Utils, &invocation).await.expect("show");

        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(h.api.side_effect_count().await, 0);
    }

    #[tokio::test]
    async fn static_replies_go_to_the_originating_thread() {
        let h = harness(ControlMode::Pinned, StaticMembership::new(Vec::new()));

        h.core
            .reply(&command(BotCommand::Rules, Some(77)), keyboards::rules_message())
            .await
            .expect("reply");

        let sent = h.api.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_thread_id, Some(77));
        assert!(sent[0].text.contains("RULES"));
    }

    #[tokio::test]
    async fn both_control_topics_track_separate_messages() {
        let h = harness(ControlMode::Pinned, StaticMembership::new(Vec::new()));

        h.core
            .show_controls(Topic::Utils, &command(BotCommand::Deploy, Some(TOPICS.utils)))
            .await
            .expect("utils");
        h.core
            .show_controls(Topic::Qa, &command(BotCommand::Bugs, Some(TOPICS.qa)))
            .await
            .expect("qa");

        let utils = h.core.pinned_message(Topic::Utils).await.expect("utils pinned");
        let qa = h.core.pinned_message(Topic::Qa).await.expect("qa pinned");
        assert_ne!(utils, qa);
        assert_eq!(h.api.sent_to_thread(TOPICS.utils).await.len(), 1);
        assert_eq!(h.api.sent_to_thread(TOPICS.qa).await.len(), 1);
    }
}
