use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use qabot_core::domain::bug::BugId;
use qabot_core::domain::deployment::DeploymentKind;
use qabot_core::domain::member::Member;
use qabot_core::topics::Topic;

use crate::events::{CallbackEvent, CommandEvent, HandlerResult};
use crate::keyboards::{self, MessageTemplate};

static ASSIGN_BUG_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn assign_bug_pattern() -> Option<&'static Regex> {
    ASSIGN_BUG_PATTERN.get_or_init(|| Regex::new(r"^assign_bug_(\d+)_(\d+)$").ok()).as_ref()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BotCommand {
    Start,
    Deploy,
    SetupUtils,
    Bugs,
    Filed,
    SetupQa,
    Rules,
    Help,
}

impl BotCommand {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "deploy" => Some(Self::Deploy),
            "setup_utils" => Some(Self::SetupUtils),
            "bugs" => Some(Self::Bugs),
            "filed" => Some(Self::Filed),
            "setup_qa" => Some(Self::SetupQa),
            "rules" => Some(Self::Rules),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Deploy => "deploy",
            Self::SetupUtils => "setup_utils",
            Self::Bugs => "bugs",
            Self::Filed => "filed",
            Self::SetupQa => "setup_qa",
            Self::Rules => "rules",
            Self::Help => "help",
        }
    }

    /// Topic whose control message the command shows. Static commands answer
    /// anywhere and have none.
    pub fn topic(self) -> Option<Topic> {
        match self {
            Self::Start | Self::Deploy | Self::SetupUtils => Some(Topic::Utils),
            Self::Bugs | Self::Filed | Self::SetupQa => Some(Topic::Qa),
            Self::Rules | Self::Help => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: BotCommand,
    pub addressee: Option<String>,
}

/// Parses `/name[@bot] [args]`. Returns `None` for plain text and unknown
/// commands. Arguments are accepted and dropped.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix('/')?;
    let head = rest.split(char::is_whitespace).next().unwrap_or(rest);
    let (name, addressee) = match head.split_once('@') {
        Some((name, bot)) => (name, Some(bot.to_owned())),
        None => (head, None),
    };

    let command = BotCommand::from_name(&name.to_ascii_lowercase())?;
    Some(ParsedCommand { command, addressee })
}

/// Button payloads understood by the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Deploy(DeploymentKind),
    FileBug,
    AssignBug { bug_id: BugId, assignee_id: i64 },
    /// Shaped like an assignment but naming ids too large for any stored bug
    /// or user. Never rendered on a button.
    UnreadableAssignment,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "deploy_ui" => return Some(Self::Deploy(DeploymentKind::Ui)),
            "deploy_backend" => return Some(Self::Deploy(DeploymentKind::Backend)),
            "filed_bugs" => return Some(Self::FileBug),
            _ => {}
        }

        let captures = assign_bug_pattern()?.captures(data)?;
        let bug_id = captures.get(1)?.as_str().parse::<i64>();
        let assignee_id = captures.get(2)?.as_str().parse::<i64>();
        match (bug_id, assignee_id) {
            (Ok(bug_id), Ok(assignee_id)) => {
                Some(Self::AssignBug { bug_id: BugId(bug_id), assignee_id })
            }
            _ => Some(Self::UnreadableAssignment),
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Self::Deploy(kind) => format!("deploy_{}", kind.as_str()),
            Self::FileBug => "filed_bugs".to_owned(),
            Self::AssignBug { bug_id, assignee_id } => format!("assign_bug_{bug_id}_{assignee_id}"),
            Self::UnreadableAssignment => "assign_bug".to_owned(),
        }
    }

    pub fn topic(&self) -> Topic {
        match self {
            Self::Deploy(_) => Topic::Utils,
            Self::FileBug | Self::AssignBug { .. } | Self::UnreadableAssignment => Topic::Qa,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: BotCommand,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub from: Option<Member>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackInvocation {
    pub callback_id: String,
    pub action: CallbackAction,
    pub from: Option<Member>,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub thread_id: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

#[async_trait]
pub trait ControlService: Send + Sync {
    /// Shows (or re-renders) the control message of `topic`.
    async fn show_controls(
        &self,
        topic: Topic,
        invocation: &CommandInvocation,
    ) -> Result<HandlerResult, CommandRouteError>;

    /// Replies in the thread the command came from.
    async fn reply(
        &self,
        invocation: &CommandInvocation,
        message: MessageTemplate,
    ) -> Result<HandlerResult, CommandRouteError>;
}

#[async_trait]
pub trait InteractionService: Send + Sync {
    async fn record_deployment(
        &self,
        kind: DeploymentKind,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError>;

    async fn file_bug(
        &self,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError>;

    async fn assign_bug(
        &self,
        bug_id: BugId,
        assignee_id: i64,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError>;

    /// Answers an assignment press whose ids cannot be read.
    async fn reject_selection(
        &self,
        invocation: &CallbackInvocation,
    ) -> Result<HandlerResult, CommandRouteError>;
}

pub struct CommandRouter<S> {
    service: S,
    bot_username: Option<String>,
}

impl<S> CommandRouter<S>
where
    S: ControlService,
{
    pub fn new(service: S) -> Self {
        Self { service, bot_username: None }
    }

    /// Commands suffixed with another bot's name are then ignored.
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    pub async fn route(&self, event: &CommandEvent) -> Result<HandlerResult, CommandRouteError> {
        let Some(parsed) = parse_command(&event.text) else {
            return Ok(HandlerResult::Ignored);
        };
        if !self.is_addressed_to_us(parsed.addressee.as_deref()) {
            return Ok(HandlerResult::Ignored);
        }

        let invocation = CommandInvocation {
            command: parsed.command,
            chat_id: event.chat_id,
            thread_id: event.thread_id,
            message_id: event.message_id,
            from: event.from.clone(),
        };

        match parsed.command {
            BotCommand::Rules => self.service.reply(&invocation, keyboards::rules_message()).await,
            BotCommand::Help => self.service.reply(&invocation, keyboards::help_message()).await,
            command => match command.topic() {
                Some(topic) => self.service.show_controls(topic, &invocation).await,
                None => Ok(HandlerResult::Ignored),
            },
        }
    }

    fn is_addressed_to_us(&self, addressee: Option<&str>) -> bool {
        match (addressee, self.bot_username.as_deref()) {
            (Some(addressee), Some(ours)) => addressee.eq_ignore_ascii_case(ours),
            _ => true,
        }
    }
}

pub struct CallbackRouter<S> {
    service: S,
}

impl<S> CallbackRouter<S>
where
    S: InteractionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(&self, event: &CallbackEvent) -> Result<HandlerResult, CommandRouteError> {
        let Some(action) = event.data.as_deref().and_then(CallbackAction::parse) else {
            return Ok(HandlerResult::Ignored);
        };

        let invocation = CallbackInvocation {
            callback_id: event.callback_id.clone(),
            action,
            from: event.from.clone(),
            chat_id: event.chat_id,
            message_id: event.message_id,
            thread_id: event.thread_id,
        };

        match action {
            CallbackAction::Deploy(kind) => self.service.record_deployment(kind, &invocation).await,
            CallbackAction::FileBug => self.service.file_bug(&invocation).await,
            CallbackAction::AssignBug { bug_id, assignee_id } => {
                self.service.assign_bug(bug_id, assignee_id, &invocation).await
            }
            CallbackAction::UnreadableAssignment => {
                self.service.reject_selection(&invocation).await
            }
        }
    }
}
