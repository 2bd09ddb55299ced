use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use qabot_core::domain::member::Member;

use crate::api::Update;
use crate::commands::{
    CallbackRouter, CommandRouteError, CommandRouter, ControlService, InteractionService,
};
use crate::keyboards::MessageTemplate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotUpdate {
    pub update_id: i64,
    pub event: BotEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotEvent {
    Command(CommandEvent),
    Callback(CallbackEvent),
    Unsupported { kind: String },
}

impl BotEvent {
    pub fn event_type(&self) -> BotEventType {
        match self {
            Self::Command(_) => BotEventType::Command,
            Self::Callback(_) => BotEventType::Callback,
            Self::Unsupported { .. } => BotEventType::Unsupported,
        }
    }

    pub fn thread_id(&self) -> Option<i64> {
        match self {
            Self::Command(event) => event.thread_id,
            Self::Callback(event) => event.thread_id,
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BotEventType {
    Command,
    Callback,
    Unsupported,
}

/// A text message that starts with `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEvent {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub from: Option<Member>,
    pub text: String,
}

/// A button press. Origin fields come from the message carrying the button
/// and are absent when that message is no longer accessible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackEvent {
    pub callback_id: String,
    pub from: Option<Member>,
    pub data: Option<String>,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub thread_id: Option<i64>,
}

impl From<Update> for BotUpdate {
    fn from(update: Update) -> Self {
        let event = if let Some(query) = update.callback_query {
            let origin = query.message.as_ref();
            BotEvent::Callback(CallbackEvent {
                callback_id: query.id,
                from: Some(query.from.to_member()),
                data: query.data,
                chat_id: origin.map(|message| message.chat.id),
                message_id: origin.map(|message| message.message_id),
                thread_id: origin.and_then(|message| message.message_thread_id),
            })
        } else if let Some(message) = update.message {
            match message.text {
                Some(text) if text.trim_start().starts_with('/') => {
                    BotEvent::Command(CommandEvent {
                        chat_id: message.chat.id,
                        thread_id: message.message_thread_id,
                        message_id: message.message_id,
                        from: message.from.as_ref().map(|user| user.to_member()),
                        text,
                    })
                }
                _ => BotEvent::Unsupported { kind: "message".to_owned() },
            }
        } else {
            BotEvent::Unsupported { kind: "other".to_owned() }
        };

        Self { update_id: update.update_id, event }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn for_update(update: &BotUpdate) -> Self {
        Self { correlation_id: format!("update-{}", update.update_id) }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// A message was sent or edited with this content.
    Responded(MessageTemplate),
    /// The button press was answered with this text.
    Answered(String),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> BotEventType;
    async fn handle(
        &self,
        update: &BotUpdate,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<BotEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        update: &BotUpdate,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&update.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(update, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired to a single service for both commands and button presses.
pub fn bot_dispatcher<S>(service: S, bot_username: Option<String>) -> EventDispatcher
where
    S: ControlService + InteractionService + Clone + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(CommandHandler::new(service.clone()).with_bot_username(bot_username));
    dispatcher.register(CallbackHandler::new(service));
    dispatcher
}

pub struct CommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> CommandHandler<S>
where
    S: ControlService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }

    pub fn with_bot_username(self, username: Option<String>) -> Self {
        Self { router: self.router.with_bot_username(username) }
    }
}

#[async_trait]
impl<S> EventHandler for CommandHandler<S>
where
    S: ControlService + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::Command
    }

    async fn handle(
        &self,
        update: &BotUpdate,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::Command(event) = &update.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(self.router.route(event).await?)
    }
}

pub struct CallbackHandler<S> {
    router: CallbackRouter<S>,
}

impl<S> CallbackHandler<S>
where
    S: InteractionService,
{
    pub fn new(service: S) -> Self {
        Self { router: CallbackRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for CallbackHandler<S>
where
    S: InteractionService + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::Callback
    }

    async fn handle(
        &self,
        update: &BotUpdate,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::Callback(event) = &update.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(self.router.route(event).await?)
    }
}
