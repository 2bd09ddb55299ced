use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::{BotApi, Update};
use crate::events::{BotUpdate, EventContext, EventDispatcher};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollingError {
    #[error("receive loop gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of inbound updates. `next_update` returning `None` means the
/// stream ended cleanly.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_update(&self) -> Result<Option<BotUpdate>, TransportError>;
    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// `getUpdates` long polling. The offset only moves past an update once it
/// is acknowledged, so a reconnect re-fetches anything not yet handled.
pub struct LongPollTransport {
    api: Arc<dyn BotApi>,
    timeout_secs: u64,
    state: Mutex<LongPollState>,
}

#[derive(Default)]
struct LongPollState {
    offset: i64,
    buffered: VecDeque<Update>,
    bot_username: Option<String>,
}

impl LongPollTransport {
    pub fn new(api: Arc<dyn BotApi>, timeout_secs: u64) -> Self {
        Self { api, timeout_secs, state: Mutex::new(LongPollState::default()) }
    }

    /// Username reported by `getMe` on the last successful connect.
    pub async fn bot_username(&self) -> Option<String> {
        self.state.lock().await.bot_username.clone()
    }
}

#[async_trait]
impl UpdateTransport for LongPollTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let me =
            self.api.get_me().await.map_err(|error| TransportError::Connect(error.to_string()))?;
        self.state.lock().await.bot_username = me.username;
        Ok(())
    }

    async fn next_update(&self) -> Result<Option<BotUpdate>, TransportError> {
        let mut state = self.state.lock().await;
        while state.buffered.is_empty() {
            let batch = self
                .api
                .get_updates(state.offset, self.timeout_secs)
                .await
                .map_err(|error| TransportError::Receive(error.to_string()))?;
            state.buffered.extend(batch);
        }

        Ok(state.buffered.pop_front().map(BotUpdate::from))
    }

    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.offset = state.offset.max(update_id + 1);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state.lock().await.buffered.clear();
        Ok(())
    }
}

/// Pulls one update at a time and runs it through the dispatcher before
/// asking for the next.
pub struct PollingRunner {
    transport: Arc<dyn UpdateTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl PollingRunner {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Runs until the transport closes the stream. Transport failures are
    /// retried with backoff; the attempt counter resets once an update has
    /// been handled on the new connection.
    pub async fn start(&self) -> Result<(), PollingError> {
        let mut attempt = 0_u32;
        loop {
            let mut handled = 0_u64;
            let transport_error = match self.connect_and_pump(attempt, &mut handled).await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };
            if handled > 0 {
                attempt = 0;
            }

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                error = %transport_error,
                "long poll transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                error!(
                    max_retries = self.reconnect_policy.max_retries,
                    "long poll retries exhausted"
                );
                return Err(PollingError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: transport_error,
                });
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        handled: &mut u64,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening long poll transport");
        self.transport.connect().await?;
        info!(attempt, "long poll transport connected");

        loop {
            let Some(update) = self.transport.next_update().await? else {
                info!(attempt, "long poll transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let context = EventContext::for_update(&update);

            info!(
                event_name = "ingress.telegram.update_received",
                update_id = update.update_id,
                event_type = ?update.event.event_type(),
                correlation_id = %context.correlation_id,
                thread_id = ?update.event.thread_id(),
                "received telegram update"
            );

            if let Err(error) = self.transport.acknowledge(update.update_id).await {
                warn!(
                    event_name = "ingress.telegram.ack_sent",
                    update_id = update.update_id,
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "failed to acknowledge telegram update"
                );
            }

            match self.dispatcher.dispatch(&update, &context).await {
                Ok(result) => debug!(
                    event_name = "ingress.telegram.update_handled",
                    update_id = update.update_id,
                    correlation_id = %context.correlation_id,
                    result = ?result,
                    "telegram update handled"
                ),
                Err(error) => warn!(
                    update_id = update.update_id,
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "event dispatch failed; continuing receive loop"
                ),
            }
            *handled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{
        LongPollTransport, PollingError, PollingRunner, ReconnectPolicy, TransportError,
        UpdateTransport,
    };
    use crate::api::{ApiError, Update};
    use crate::commands::CommandRouteError;
    use crate::events::{
        BotEvent, BotEventType, BotUpdate, EventContext, EventDispatcher, EventHandler,
        EventHandlerError, HandlerResult,
    };
    use crate::testing::RecordingBotApi;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        updates: VecDeque<Result<Option<BotUpdate>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<i64>,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            updates: Vec<Result<Option<BotUpdate>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    updates: updates.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<i64> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl UpdateTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_update(&self) -> Result<Option<BotUpdate>, TransportError> {
            self.state.lock().await.updates.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
            self.state.lock().await.acknowledgements.push(update_id);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Fails every update it sees.
    #[derive(Default)]
    struct FailingHandler {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    #[async_trait]
    impl EventHandler for FailingHandler {
        fn event_type(&self) -> BotEventType {
            BotEventType::Unsupported
        }

        async fn handle(
            &self,
            update: &BotUpdate,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            self.seen.lock().await.push(update.update_id);
            Err(CommandRouteError::Service("boom".to_owned()).into())
        }
    }

    fn unsupported(update_id: i64) -> BotUpdate {
        BotUpdate { update_id, event: BotEvent::Unsupported { kind: "test".to_owned() } }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(unsupported(1))), Ok(None)],
        ));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should finish");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec![1]);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        let error = runner.start().await.expect_err("retries exhausted");
        assert_eq!(
            error,
            PollingError::RetriesExhausted {
                attempts: 3,
                last: TransportError::Connect("fail-3".to_owned()),
            }
        );
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn handled_updates_reset_the_retry_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                Err(TransportError::Receive("reset-1".to_owned())),
                Ok(Some(unsupported(1))),
                Err(TransportError::Receive("reset-2".to_owned())),
                Ok(Some(unsupported(2))),
                Err(TransportError::Receive("reset-3".to_owned())),
                Ok(None),
            ],
        ));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), no_delay(1));

        runner.start().await.expect("progress between failures keeps the loop alive");
        assert_eq!(transport.acknowledgements().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn dispatch_failures_do_not_stop_the_loop() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![Ok(Some(unsupported(7))), Ok(Some(unsupported(8))), Ok(None)],
        ));
        let handler = FailingHandler::default();
        let seen = handler.seen.clone();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(handler);

        let runner = PollingRunner::new(transport.clone(), dispatcher, no_delay(0));

        runner.start().await.expect("runner should finish");
        assert_eq!(*seen.lock().await, vec![7, 8]);
    }

    #[tokio::test]
    async fn long_poll_offset_advances_on_acknowledge() {
        let api = Arc::new(RecordingBotApi::default());
        api.push_updates(Ok(vec![
            Update { update_id: 5, message: None, callback_query: None },
            Update { update_id: 6, message: None, callback_query: None },
        ]))
        .await;
        let transport = LongPollTransport::new(api.clone(), 0);

        transport.connect().await.expect("connect");
        assert_eq!(transport.bot_username().await.as_deref(), Some("qa_team_bot"));

        for expected in [5, 6] {
            let update = transport.next_update().await.expect("update").expect("open stream");
            assert_eq!(update.update_id, expected);
            transport.acknowledge(update.update_id).await.expect("ack");
        }
        let exhausted = transport.next_update().await;

        assert!(matches!(exhausted, Err(TransportError::Receive(_))));
        assert_eq!(api.polled_offsets().await, vec![0, 7]);
    }

    #[tokio::test]
    async fn empty_polls_keep_waiting() {
        let api = Arc::new(RecordingBotApi::default());
        api.push_updates(Ok(Vec::new())).await;
        api.push_updates(Err(ApiError::Transport {
            method: "getUpdates",
            message: "timed out".to_owned(),
        }))
        .await;
        let transport = LongPollTransport::new(api.clone(), 0);

        let result = transport.next_update().await;

        assert!(matches!(
            result,
            Err(TransportError::Receive(message)) if message.contains("timed out")
        ));
        assert_eq!(api.polled_offsets().await, vec![0, 0]);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(5_000));
    }
}
