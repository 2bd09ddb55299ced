//! In-process fakes for the Bot API and membership lookups.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use qabot_core::domain::member::Member;

use crate::api::{
    ApiError, BotApi, Chat, ChatMember, EditMessageText, Message, SendMessage, Update, User,
};
use crate::membership::{MembershipError, MembershipResolver};

/// Records every outbound call and answers from a script.
#[derive(Default)]
pub struct RecordingBotApi {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    last_message_id: i64,
    sent: Vec<SendMessage>,
    edits: Vec<EditMessageText>,
    pins: Vec<(i64, i64)>,
    answers: Vec<(String, Option<String>)>,
    administrators: Vec<ChatMember>,
    administrators_error: Option<ApiError>,
    missing_messages: HashSet<i64>,
    fail_pins: bool,
    fail_sends: bool,
    updates: VecDeque<Result<Vec<Update>, ApiError>>,
    polled_offsets: Vec<i64>,
}

impl RecordingBotApi {
    pub async fn set_administrators(&self, administrators: Vec<ChatMember>) {
        let mut state = self.state.lock().await;
        state.administrators = administrators;
        state.administrators_error = None;
    }

    pub async fn set_members(&self, members: &[Member]) {
        let administrators = members
            .iter()
            .map(|member| ChatMember {
                status: "administrator".to_owned(),
                user: User {
                    id: member.id,
                    is_bot: false,
                    first_name: member.first_name.clone(),
                    last_name: member.last_name.clone(),
                    username: member.username.clone(),
                },
            })
            .collect();
        self.set_administrators(administrators).await;
    }

    pub async fn fail_administrators(&self, error: ApiError) {
        self.state.lock().await.administrators_error = Some(error);
    }

    /// Edits against `message_id` fail as if the message had been deleted.
    pub async fn forget_message(&self, message_id: i64) {
        self.state.lock().await.missing_messages.insert(message_id);
    }

    pub async fn fail_pins(&self) {
        self.state.lock().await.fail_pins = true;
    }

    pub async fn fail_sends(&self) {
        self.state.lock().await.fail_sends = true;
    }

    pub async fn push_updates(&self, batch: Result<Vec<Update>, ApiError>) {
        self.state.lock().await.updates.push_back(batch);
    }

    pub async fn sent_messages(&self) -> Vec<SendMessage> {
        self.state.lock().await.sent.clone()
    }

    pub async fn edits(&self) -> Vec<EditMessageText> {
        self.state.lock().await.edits.clone()
    }

    pub async fn pins(&self) -> Vec<(i64, i64)> {
        self.state.lock().await.pins.clone()
    }

    pub async fn answers(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().await.answers.clone()
    }

    pub async fn polled_offsets(&self) -> Vec<i64> {
        self.state.lock().await.polled_offsets.clone()
    }

    /// Messages sent into `thread_id`.
    pub async fn sent_to_thread(&self, thread_id: i64) -> Vec<SendMessage> {
        self.state
            .lock()
            .await
            .sent
            .iter()
            .filter(|message| message.message_thread_id == Some(thread_id))
            .cloned()
            .collect()
    }

    /// Outbound calls that change what users see.
    pub async fn side_effect_count(&self) -> usize {
        let state = self.state.lock().await;
        state.sent.len() + state.edits.len() + state.pins.len() + state.answers.len()
    }
}

#[async_trait]
impl BotApi for RecordingBotApi {
    async fn get_me(&self) -> Result<User, ApiError> {
        Ok(User {
            id: 999,
            is_bot: true,
            first_name: "QA Bot".to_owned(),
            last_name: None,
            username: Some("qa_team_bot".to_owned()),
        })
    }

    async fn get_updates(&self, offset: i64, _timeout_secs: u64) -> Result<Vec<Update>, ApiError> {
        let mut state = self.state.lock().await;
        state.polled_offsets.push(offset);
        state.updates.pop_front().unwrap_or_else(|| {
            Err(ApiError::Transport {
                method: "getUpdates",
                message: "no scripted updates left".to_owned(),
            })
        })
    }

    async fn send_message(&self, request: SendMessage) -> Result<Message, ApiError> {
        let mut state = self.state.lock().await;
        if state.fail_sends {
            return Err(ApiError::Transport {
                method: "sendMessage",
                message: "connection reset".to_owned(),
            });
        }

        state.last_message_id += 1;
        let message = Message {
            message_id: state.last_message_id,
            message_thread_id: request.message_thread_id,
            chat: Chat { id: request.chat_id, kind: "supergroup".to_owned(), title: None },
            from: None,
            text: Some(request.text.clone()),
        };
        state.sent.push(request);
        Ok(message)
    }

    async fn edit_message_text(&self, request: EditMessageText) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        if state.missing_messages.contains(&request.message_id) {
            return Err(ApiError::Rejected {
                method: "editMessageText",
                code: 400,
                description: "Bad Request: message to edit not found".to_owned(),
            });
        }
        state.edits.push(request);
        Ok(())
    }

    async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        if state.fail_pins {
            return Err(ApiError::Rejected {
                method: "pinChatMessage",
                code: 400,
                description: "Bad Request: not enough rights to manage pinned messages".to_owned(),
            });
        }
        state.pins.push((chat_id, message_id));
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.answers.push((callback_query_id.to_owned(), text.map(str::to_owned)));
        Ok(())
    }

    async fn get_chat_administrators(&self, _chat_id: i64) -> Result<Vec<ChatMember>, ApiError> {
        let state = self.state.lock().await;
        match &state.administrators_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.administrators.clone()),
        }
    }
}

/// Returns a fixed member list, or a fixed failure.
pub struct StaticMembership {
    result: Result<Vec<Member>, MembershipError>,
    calls: Mutex<usize>,
}

impl StaticMembership {
    pub fn new(members: Vec<Member>) -> Self {
        Self { result: Ok(members), calls: Mutex::new(0) }
    }

    pub fn failing(message: &str) -> Self {
        Self { result: Err(MembershipError::Fetch(message.to_owned())), calls: Mutex::new(0) }
    }

    pub async fn calls(&self) -> usize {
        *self.calls.lock().await
    }
}

#[async_trait]
impl MembershipResolver for StaticMembership {
    async fn list_human_members(&self, _chat_id: i64) -> Result<Vec<Member>, MembershipError> {
        *self.calls.lock().await += 1;
        self.result.clone()
    }
}
