use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use qabot_core::domain::member::Member;

use crate::keyboards::{InlineKeyboardMarkup, MessageTemplate, ParseMode};

const NOT_MODIFIED: &str = "message is not modified";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    pub fn to_member(&self) -> Member {
        Member {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            username: self.username.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

impl SendMessage {
    pub fn new(chat_id: i64, template: &MessageTemplate) -> Self {
        Self {
            chat_id,
            text: template.text.clone(),
            message_thread_id: None,
            parse_mode: template.parse_mode,
            reply_markup: template.keyboard.clone(),
        }
    }

    pub fn in_thread(mut self, thread_id: Option<i64>) -> Self {
        self.message_thread_id = thread_id;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EditMessageText {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

impl EditMessageText {
    pub fn new(chat_id: i64, message_id: i64, template: &MessageTemplate) -> Self {
        Self {
            chat_id,
            message_id,
            text: template.text.clone(),
            parse_mode: template.parse_mode,
            reply_markup: template.keyboard.clone(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("bot api `{method}` request failed: {message}")]
    Transport { method: &'static str, message: String },
    #[error("bot api `{method}` rejected with {code}: {description}")]
    Rejected { method: &'static str, code: i64, description: String },
    #[error("bot api `{method}` response could not be decoded: {message}")]
    Decode { method: &'static str, message: String },
    #[error("bot api client could not be built: {0}")]
    Client(String),
}

impl ApiError {
    /// Editing a message to identical content is reported as an error by the
    /// platform even though the message still exists.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Self::Rejected { description, .. } if description.contains(NOT_MODIFIED))
    }
}

#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_me(&self) -> Result<User, ApiError>;
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError>;
    async fn send_message(&self, request: SendMessage) -> Result<Message, ApiError>;
    async fn edit_message_text(&self, request: EditMessageText) -> Result<(), ApiError>;
    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError>;
    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), ApiError>;
    async fn get_chat_administrators(&self, chat_id: i64) -> Result<Vec<ChatMember>, ApiError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

/// JSON-over-HTTPS client for `{api_base}/bot{token}/{method}`.
pub struct HttpBotApi {
    client: reqwest::Client,
    api_base: String,
    token: SecretString,
    request_timeout: Duration,
}

impl HttpBotApi {
    pub fn new(
        api_base: &str,
        token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| ApiError::Client(error.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim().trim_end_matches('/').to_owned(),
            token,
            request_timeout,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token.expose_secret())
    }

    async fn call<P, T>(
        &self,
        method: &'static str,
        payload: &P,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.endpoint(method)).json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Errors are stripped of their URL because it embeds the token.
        let response = request.send().await.map_err(|error| ApiError::Transport {
            method,
            message: error.without_url().to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| ApiError::Transport {
            method,
            message: error.without_url().to_string(),
        })?;

        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|error| {
            ApiError::Decode { method, message: format!("HTTP {status}: {error}") }
        })?;

        if !envelope.ok {
            return Err(ApiError::Rejected {
                method,
                code: envelope.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: envelope.description.unwrap_or_default(),
            });
        }

        envelope.result.ok_or_else(|| ApiError::Decode {
            method,
            message: "successful response is missing `result`".to_owned(),
        })
    }
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn get_me(&self) -> Result<User, ApiError> {
        self.call("getMe", &json!({}), None).await
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let timeout = Duration::from_secs(timeout_secs) + self.request_timeout;
        self.call("getUpdates", &payload, Some(timeout)).await
    }

    async fn send_message(&self, request: SendMessage) -> Result<Message, ApiError> {
        self.call("sendMessage", &request, None).await
    }

    async fn edit_message_text(&self, request: EditMessageText) -> Result<(), ApiError> {
        // The result is either the edited message or `true`.
        let _: serde_json::Value = self.call("editMessageText", &request, None).await?;
        Ok(())
    }

    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "disable_notification": true,
        });
        let _: bool = self.call("pinChatMessage", &payload, None).await?;
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), ApiError> {
        let payload = match text {
            Some(text) => json!({ "callback_query_id": callback_query_id, "text": text }),
            None => json!({ "callback_query_id": callback_query_id }),
        };
        let _: bool = self.call("answerCallbackQuery", &payload, None).await?;
        Ok(())
    }

    async fn get_chat_administrators(&self, chat_id: i64) -> Result<Vec<ChatMember>, ApiError> {
        self.call("getChatAdministrators", &json!({ "chat_id": chat_id }), None).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::{ApiError, BotApi, EditMessageText, HttpBotApi, SendMessage};
    use crate::keyboards::deployment_control_message;

    fn client(server: &MockServer) -> HttpBotApi {
        HttpBotApi::new(
            &server.base_url(),
            "123:test-token".to_owned().into(),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn send_message_posts_thread_and_keyboard() {
        let server = MockServer::start();
        let sent = server.mock(|when, then| {
            when.method(POST)
                .path("/bot123:test-token/sendMessage")
                .body_includes("\"message_thread_id\":77")
                .body_includes("\"callback_data\":\"deploy_ui\"")
                .body_includes("\"parse_mode\":\"Markdown\"");
            then.status(200).json_body(json!({
                "ok": true,
                "result": {
                    "message_id": 501,
                    "message_thread_id": 77,
                    "chat": { "id": -100, "type": "supergroup" }
                }
            }));
        });

        let message = client(&server)
            .send_message(SendMessage::new(-100, &deployment_control_message()).in_thread(Some(77)))
            .await
            .expect("send");

        sent.assert_calls(1);
        assert_eq!(message.message_id, 501);
        assert_eq!(message.message_thread_id, Some(77));
    }

    #[tokio::test]
    async fn rejected_call_surfaces_description_and_code() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bot123:test-token/editMessageText");
            then.status(400).json_body(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message to edit not found"
            }));
        });

        let error = client(&server)
            .edit_message_text(EditMessageText::new(-100, 9, &deployment_control_message()))
            .await
            .expect_err("edit should fail");

        assert!(matches!(
            error,
            ApiError::Rejected { method: "editMessageText", code: 400, ref description }
                if description.contains("not found")
        ));
        assert!(!error.is_not_modified());
    }

    #[tokio::test]
    async fn unchanged_edit_is_recognised() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bot123:test-token/editMessageText");
            then.status(400).json_body(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message is not modified: specified new message content and reply markup are exactly the same"
            }));
        });

        let error = client(&server)
            .edit_message_text(EditMessageText::new(-100, 9, &deployment_control_message()))
            .await
            .expect_err("edit should be rejected");

        assert!(error.is_not_modified());
    }

    #[tokio::test]
    async fn administrators_decode_bot_flag() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/bot123:test-token/getChatAdministrators")
                .body_includes("\"chat_id\":-100");
            then.status(200).json_body(json!({
                "ok": true,
                "result": [
                    { "status": "creator", "user": { "id": 1, "is_bot": false, "first_name": "Alice", "username": "alice" } },
                    { "status": "administrator", "user": { "id": 2, "is_bot": true, "first_name": "QA Bot" } }
                ]
            }));
        });

        let admins = client(&server).get_chat_administrators(-100).await.expect("admins");

        assert_eq!(admins.len(), 2);
        assert!(!admins[0].user.is_bot);
        assert!(admins[1].user.is_bot);
        assert_eq!(admins[0].user.to_member().username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn get_updates_sends_offset_and_decodes_callbacks() {
        let server = MockServer::start();
        let polled = server.mock(|when, then| {
            when.method(POST)
                .path("/bot123:test-token/getUpdates")
                .body_includes("\"offset\":42")
                .body_includes("\"timeout\":0");
            then.status(200).json_body(json!({
                "ok": true,
                "result": [{
                    "update_id": 42,
                    "callback_query": {
                        "id": "cb-1",
                        "from": { "id": 7, "is_bot": false, "first_name": "Bob" },
                        "data": "filed_bugs",
                        "message": {
                            "message_id": 600,
                            "message_thread_id": 12,
                            "chat": { "id": -100, "type": "supergroup" }
                        }
                    }
                }]
            }));
        });

        let updates = client(&server).get_updates(42, 0).await.expect("updates");

        polled.assert_calls(1);
        let callback = updates[0].callback_query.as_ref().expect("callback");
        assert_eq!(callback.data.as_deref(), Some("filed_bugs"));
        assert_eq!(callback.message.as_ref().and_then(|m| m.message_thread_id), Some(12));
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bot123:test-token/getMe");
            then.status(502).body("<html>bad gateway</html>");
        });

        let error = client(&server).get_me().await.expect_err("decode failure");
        assert!(matches!(error, ApiError::Decode { method: "getMe", .. }));
    }
}
