//! Finds the ids needed to configure the bot: add it to the forum chat, run
//! this command, and post a message in each topic while it polls.
//!
//! Only `BOT_TOKEN` (and optionally `QABOT_API_BASE`) must be set, since the
//! chat and topic ids are what this command is for. Updates are read without
//! being confirmed, so the running bot still receives them afterwards.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use qabot_core::config::DEFAULT_API_BASE;
use qabot_telegram::api::{ApiError, BotApi, HttpBotApi, Message, Update};
use secrecy::SecretString;

use crate::commands::{runtime, CommandResult};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChatSighting {
    pub title: Option<String>,
    /// Topic id -> sample text seen in that topic.
    pub topics: BTreeMap<i64, String>,
    pub general_messages: usize,
}

pub fn run(timeout_secs: u64) -> CommandResult {
    let Some(token) = env::var("BOT_TOKEN").ok().filter(|value| !value.trim().is_empty()) else {
        return CommandResult::failure(
            "discover",
            "config_validation",
            "BOT_TOKEN must be set to discover chat and topic ids",
            2,
        );
    };
    let api_base = env::var("QABOT_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

    let api = match HttpBotApi::new(&api_base, SecretString::from(token), Duration::from_secs(15))
    {
        Ok(api) => api,
        Err(error) => return CommandResult::failure("discover", "bot_client", error.to_string(), 3),
    };
    let runtime = match runtime("discover") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(discover(&api, timeout_secs)) {
        Ok(sightings) if sightings.is_empty() => CommandResult::success(
            "discover",
            "no messages arrived; post in each topic while the command is polling",
        ),
        Ok(sightings) => CommandResult::success("discover", render(&sightings)),
        Err(error) => CommandResult::failure("discover", "bot_api", error.to_string(), 4),
    }
}

/// Polls once and groups every message seen by chat id.
pub async fn discover(
    api: &dyn BotApi,
    timeout_secs: u64,
) -> Result<BTreeMap<i64, ChatSighting>, ApiError> {
    let updates = api.get_updates(0, timeout_secs).await?;
    Ok(collect(&updates))
}

fn collect(updates: &[Update]) -> BTreeMap<i64, ChatSighting> {
    let mut sightings: BTreeMap<i64, ChatSighting> = BTreeMap::new();
    let messages = updates.iter().filter_map(|update| {
        update
            .message
            .as_ref()
            .or_else(|| update.callback_query.as_ref().and_then(|query| query.message.as_ref()))
    });

    for message in messages {
        record(sightings.entry(message.chat.id).or_default(), message);
    }
    sightings
}

fn record(sighting: &mut ChatSighting, message: &Message) {
    if sighting.title.is_none() {
        sighting.title = message.chat.title.clone();
    }
    match message.message_thread_id {
        Some(thread_id) => {
            let sample = message.text.clone().unwrap_or_default();
            sighting.topics.entry(thread_id).or_insert(sample);
        }
        None => sighting.general_messages += 1,
    }
}

fn render(sightings: &BTreeMap<i64, ChatSighting>) -> String {
    let mut lines = Vec::new();
    for (chat_id, sighting) in sightings {
        let title = sighting.title.as_deref().unwrap_or("untitled");
        lines.push(format!("chat {chat_id} ({title}) -> CHAT_ID={chat_id}"));
        for (thread_id, sample) in &sighting.topics {
            lines.push(format!("  - topic {thread_id}: {}", preview(sample)));
        }
        if sighting.general_messages > 0 {
            lines.push(format!(
                "  - {} message(s) outside any topic",
                sighting.general_messages
            ));
        }
    }
    lines.join("\n")
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "<no text>".to_string();
    }
    let mut short: String = trimmed.chars().take(40).collect();
    if trimmed.chars().count() > 40 {
        short.push('…');
    }
    format!("\"{short}\"")
}
