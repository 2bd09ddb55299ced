use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use qabot_core::domain::member::Member;

use crate::api::BotApi;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("failed to fetch chat members: {0}")]
    Fetch(String),
}

/// Lists the people bugs can be assigned to.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    async fn list_human_members(&self, chat_id: i64) -> Result<Vec<Member>, MembershipError>;
}

/// Uses the chat's administrator list, which for small team groups is the
/// whole team. Bot accounts are dropped.
pub struct ApiMembershipResolver {
    api: Arc<dyn BotApi>,
}

impl ApiMembershipResolver {
    pub fn new(api: Arc<dyn BotApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MembershipResolver for ApiMembershipResolver {
    async fn list_human_members(&self, chat_id: i64) -> Result<Vec<Member>, MembershipError> {
        let administrators = self
            .api
            .get_chat_administrators(chat_id)
            .await
            .map_err(|error| MembershipError::Fetch(error.to_string()))?;

        let members: Vec<Member> = administrators
            .into_iter()
            .filter(|administrator| !administrator.user.is_bot)
            .map(|administrator| administrator.user.to_member())
            .collect();

        debug!(
            event_name = "membership.resolved",
            chat_id,
            member_count = members.len(),
            "resolved assignable chat members"
        );
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ApiMembershipResolver, MembershipError, MembershipResolver};
    use crate::api::{ApiError, ChatMember, User};
    use crate::testing::RecordingBotApi;

    fn admin(id: i64, name: &str, is_bot: bool) -> ChatMember {
        ChatMember {
            status: "administrator".to_owned(),
            user: User {
                id,
                is_bot,
                first_name: name.to_owned(),
                last_name: None,
                username: None,
            },
        }
    }

    #[tokio::test]
    async fn bots_are_filtered_out() {
        let api = Arc::new(RecordingBotApi::default());
        api.set_administrators(vec![admin(1, "Alice", false), admin(2, "QA Bot", true)]).await;

        let members =
            ApiMembershipResolver::new(api).list_human_members(-100).await.expect("members");

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].first_name, "Alice");
    }

    #[tokio::test]
    async fn api_failures_are_typed() {
        let api = Arc::new(RecordingBotApi::default());
        api.fail_administrators(ApiError::Rejected {
            method: "getChatAdministrators",
            code: 403,
            description: "Forbidden: bot is not a member".to_owned(),
        })
        .await;

        let error = ApiMembershipResolver::new(api)
            .list_human_members(-100)
            .await
            .expect_err("fetch should fail");

        assert!(matches!(error, MembershipError::Fetch(ref message) if message.contains("403")));
    }
}
