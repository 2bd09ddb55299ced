use serde::{Deserialize, Serialize};

use qabot_core::domain::bug::BugId;
use qabot_core::domain::deployment::DeploymentKind;
use qabot_core::domain::member::Member;

use crate::commands::CallbackAction;

pub const ASSIGNEES_PER_ROW: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    Markdown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, action: &CallbackAction) -> Self {
        Self { text: text.into(), callback_data: action.payload() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    pub fn buttons(&self) -> impl Iterator<Item = &InlineKeyboardButton> {
        self.inline_keyboard.iter().flatten()
    }
}

/// Text plus optional keyboard, ready to be sent or edited into a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTemplate {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

pub struct MessageBuilder {
    text: String,
    parse_mode: Option<ParseMode>,
    rows: Vec<Vec<InlineKeyboardButton>>,
}

impl MessageBuilder {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), parse_mode: None, rows: Vec::new() }
    }

    pub fn markdown(mut self) -> Self {
        self.parse_mode = Some(ParseMode::Markdown);
        self
    }

    pub fn row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut RowBuilder),
    {
        let mut builder = RowBuilder::default();
        build(&mut builder);
        if !builder.buttons.is_empty() {
            self.rows.push(builder.buttons);
        }
        self
    }

    /// Lays buttons out row-major, `per_row` at a time. The last row may be
    /// shorter.
    pub fn grid<I>(mut self, buttons: I, per_row: usize) -> Self
    where
        I: IntoIterator<Item = InlineKeyboardButton>,
    {
        let buttons: Vec<_> = buttons.into_iter().collect();
        self.rows.extend(buttons.chunks(per_row.max(1)).map(<[_]>::to_vec));
        self
    }

    pub fn build(self) -> MessageTemplate {
        let keyboard = (!self.rows.is_empty())
            .then_some(InlineKeyboardMarkup { inline_keyboard: self.rows });
        MessageTemplate { text: self.text, parse_mode: self.parse_mode, keyboard }
    }
}

#[derive(Default)]
pub struct RowBuilder {
    buttons: Vec<InlineKeyboardButton>,
}

impl RowBuilder {
    pub fn button(&mut self, text: impl Into<String>, action: CallbackAction) -> &mut Self {
        self.buttons.push(InlineKeyboardButton::callback(text, &action));
        self
    }
}

pub fn deployment_control_message() -> MessageTemplate {
    MessageBuilder::new("📦 *Deployment Options*\n\nChoose deployment type:")
        .markdown()
        .row(|row| {
            row.button("UI deployed to IFT 🎨", CallbackAction::Deploy(DeploymentKind::Ui)).button(
                "Backend deployed to IFT ⚙️",
                CallbackAction::Deploy(DeploymentKind::Backend),
            );
        })
        .build()
}

pub fn bug_filing_control_message() -> MessageTemplate {
    MessageBuilder::new("*Bug Tracking*\n\nClick below to assign bugs to team members:")
        .markdown()
        .row(|row| {
            row.button("Filed bugs", CallbackAction::FileBug);
        })
        .build()
}

pub fn assignee_selection_message(bug_id: BugId, members: &[Member]) -> MessageTemplate {
    let buttons = members.iter().map(|member| {
        InlineKeyboardButton::callback(
            member.display_name(),
            &CallbackAction::AssignBug { bug_id, assignee_id: member.id },
        )
    });

    MessageBuilder::new("*Assign bugs to:*\n\nSelect a team member:")
        .markdown()
        .grid(buttons, ASSIGNEES_PER_ROW)
        .build()
}

/// Replaces the buttons after a press when control messages are not reused.
pub fn deployment_confirmation_message(
    actor_mention: &str,
    kind: DeploymentKind,
) -> MessageTemplate {
    MessageBuilder::new(format!(
        "✅ {actor_mention} deployed {label} to IFT\n\nUse /deploy to track another deployment.",
        label = kind.label()
    ))
    .markdown()
    .build()
}

pub fn assignment_completed_message(
    reporter_mention: &str,
    assignee_mention: &str,
) -> MessageTemplate {
    MessageBuilder::new(format!(
        "*Bug Assignment Completed*\n\nReporter: {reporter_mention}\nAssigned to: {assignee_mention}\n\nUse /bugs to file more bugs."
    ))
    .markdown()
    .build()
}

pub fn rules_message() -> MessageTemplate {
    MessageBuilder::new(
        "*TEAM QA BOT - RULES & GUIDE*

*DEPLOYMENT TRACKING (Utils topic)*
• Click buttons in Utils topic
• Track UI or Backend deployments to IFT
• Notifications sent to Notifications topic

*BUG ASSIGNMENT (QA topic)*
• Click button in QA topic
• Assign bugs to team members
• Tagged notifications sent to Notifications topic

*SECURITY RULES - PROHIBITED:*
❌ Sensitive business information
❌ Financial data or revenue numbers
❌ Confidential client information
❌ API keys, passwords, credentials
❌ Personal data of users/customers

*ALLOWED:*
✅ Deployment status
✅ Bug tracking
✅ QA workflow coordination
✅ Non-sensitive updates

*When in doubt:* Use messenger \"Команда\" for sensitive topics.",
    )
    .markdown()
    .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new(
        "*Available Commands:*

*Setup (Admin only, run once):*
`/setup_utils` - Create pinned deployment buttons in Utils topic
`/setup_qa` - Create pinned bug tracking button in QA topic

*Anywhere:*
`/rules` - Show bot rules and security guidelines
`/help` - Show this help message

*How to use:*
- Deployment: Click buttons in Utils topic
- Bug assignment: Click button in QA topic
- All notifications go to Notifications topic",
    )
    .markdown()
    .build()
}
