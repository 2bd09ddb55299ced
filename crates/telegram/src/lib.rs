//! Telegram Integration - long-polling bot for forum topics
//!
//! This crate provides the chat interface of the QA bot:
//! - **Bot API** (`api`) - typed `getUpdates`/`sendMessage`/... client over reqwest
//! - **Commands** (`commands`) - `/deploy`, `/bugs`, `/rules`, button payloads and routers
//! - **Events** (`events`) - update model, handlers and the dispatcher
//! - **Keyboards** (`keyboards`) - inline keyboards and fixed message texts
//! - **Workflows** (`workflows`) - topic-scoped deployment and bug-assignment transitions
//! - **Polling** (`polling`) - receive loop with reconnection logic
//!
//! # Architecture
//!
//! ```text
//! getUpdates → PollingRunner → EventDispatcher → Command/Callback routers
//!                                                      ↓
//!                      Notifications ← DispatchCore → repositories, membership
//! ```
//!
//! # Key Types
//!
//! - `PollingRunner` - sequential update loop with bounded reconnects
//! - `EventDispatcher` - routes updates to the command or callback handler
//! - `DispatchCore` - owns the pinned control messages and drives both workflows
//! - `BotApi` - seam for the Telegram Bot API; `testing` holds in-process fakes

pub mod api;
pub mod commands;
pub mod events;
pub mod keyboards;
pub mod membership;
pub mod notify;
pub mod polling;
pub mod testing;
pub mod workflows;
