//! Conversation turn: command check, backend resolution, history, bridged
//! completion, background save.

use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::{RelayError, Turn, UserId};
use chatrelay_sessions::{ConversationHistoryStore, ConversationKey, HistoryWriter, SaveJob};
use tracing::{info, instrument, warn};

use crate::bridge::{BridgeOutcome, Fingerprint, TimeoutBridge};
use crate::registry::BackendRegistry;
use crate::selector::BackendSelector;

use super::commands::{CommandDispatcher, CommandTable};
use super::context::RelayContext;

/// Composes dispatcher, selector, history and bridge into one entry point.
///
/// Every path ends in reply text: configuration problems and provider
/// failures are reported to the user, a missed deadline yields the placeholder.
pub struct ConversationOrchestrator {
    dispatcher: CommandDispatcher,
    selector: Arc<BackendSelector>,
    history: Arc<ConversationHistoryStore>,
    backends: Arc<BackendRegistry>,
    bridge: TimeoutBridge,
    writer: HistoryWriter,
    deadline: Duration,
    placeholder: String,
}

impl ConversationOrchestrator {
    /// Build all components from the host context.
    ///
    /// Fails only on invalid configuration (overlapping command keywords).
    /// Must be called inside a tokio runtime: the history writer is spawned here.
    pub fn from_context<C: RelayContext + ?Sized>(ctx: &C) -> Result<Self, RelayError> {
        let config = ctx.config();
        let store = Arc::clone(ctx.store());
        let backends = Arc::clone(ctx.backends());

        let history = Arc::new(ConversationHistoryStore::new(
            Arc::clone(&store),
            config.store.history_ttl(),
            config.relay.max_history_turns,
        ));
        let selector = Arc::new(BackendSelector::new(
            Arc::clone(&store),
            Arc::clone(&backends),
            config.replies.clone(),
            config.relay.default_backend,
        ));
        let dispatcher = CommandDispatcher::new(
            CommandTable::from_config(&config.commands)?,
            Arc::clone(&selector),
            Arc::clone(&history),
            CommandDispatcher::help_text(&config.commands, &config.replies),
        );
        let bridge = TimeoutBridge::new(
            store,
            config.store.pending_ttl(),
            config.relay.work_ceiling(),
        );
        let writer = HistoryWriter::spawn(
            Arc::clone(&history),
            config.relay.writer_concurrency,
            config.relay.writer_queue,
        );

        Ok(Self {
            dispatcher,
            selector,
            history,
            backends,
            bridge,
            writer,
            deadline: config.relay.reply_deadline(),
            placeholder: config.relay.placeholder.clone(),
        })
    }

    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    pub fn help(&self) -> &str {
        self.dispatcher.help()
    }

    pub fn writer(&self) -> &HistoryWriter {
        &self.writer
    }

    /// Produce the reply for one inbound text message.
    #[instrument(skip(self, user, raw), fields(user = %user))]
    pub async fn handle(&self, user: &UserId, raw: &str) -> String {
        if let Some(reply) = self.dispatcher.dispatch(user, raw).await {
            return reply;
        }

        let kind = self.selector.resolve_backend(user).await;
        if let Err(msg) = self.backends.check(kind) {
            info!(backend = %kind, reason = %msg, "backend unavailable");
            return msg;
        }
        let provider = match self.backends.get(kind) {
            Ok(p) => p,
            Err(e) => return e.to_string(),
        };

        let key = ConversationKey::new(kind, user.clone());
        let mut turns = self.history.load(&key, kind.supports_prompt()).await;
        turns.push(Turn::user(raw));

        let request = turns.clone();
        let work = async move {
            provider
                .complete(&request)
                .await
                .map_err(|e| format!("{} request failed: {e}", provider.name()))
        };

        let fp = Fingerprint::new(user, raw);
        match self.bridge.call_with_deadline(&fp, self.deadline, work).await {
            BridgeOutcome::Completed(Ok(reply)) | BridgeOutcome::Recovered(Ok(reply)) => {
                turns.push(Turn::assistant(reply.clone()));
                if let Err(e) = self.writer.submit(SaveJob { key, turns }) {
                    warn!(backend = %kind, error = %e, "history save not queued");
                }
                reply
            }
            BridgeOutcome::Completed(Err(msg)) | BridgeOutcome::Recovered(Err(msg)) => {
                warn!(backend = %kind, error = %msg, "completion failed");
                msg
            }
            BridgeOutcome::Placeholder => self.placeholder.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompletionProvider, ProviderError};
    use async_trait::async_trait;
    use chatrelay_core::{BackendKind, RelayConfig};
    use chatrelay_store::KeyValueStore;
    use std::sync::Mutex;

    /// Records the turns it was called with and replies with a fixed text.
    struct Recorder {
        seen: Mutex<Vec<Vec<Turn>>>,
        reply: &'static str,
    }

    #[async_trait]
    impl CompletionProvider for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn complete(&self, turns: &[Turn]) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(turns.to_vec());
            Ok(self.reply.to_string())
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl CompletionProvider for AlwaysFail {
        fn name(&self) -> &str {
            "fail"
        }
        async fn complete(&self, _turns: &[Turn]) -> Result<String, ProviderError> {
            Err(ProviderError::Unavailable("down".into()))
        }
    }

    struct TestContext {
        config: RelayConfig,
        store: Arc<KeyValueStore>,
        backends: Arc<BackendRegistry>,
    }

    impl RelayContext for TestContext {
        fn config(&self) -> &RelayConfig {
            &self.config
        }
        fn store(&self) -> &Arc<KeyValueStore> {
            &self.store
        }
        fn backends(&self) -> &Arc<BackendRegistry> {
            &self.backends
        }
    }

    fn orchestrator(registry: BackendRegistry) -> (ConversationOrchestrator, Arc<KeyValueStore>) {
        let store = Arc::new(KeyValueStore::in_memory(Duration::from_secs(60)));
        let ctx = TestContext {
            config: RelayConfig::default(),
            store: Arc::clone(&store),
            backends: Arc::new(registry),
        };
        (ConversationOrchestrator::from_context(&ctx).unwrap(), store)
    }

    #[tokio::test]
    async fn default_backend_echoes() {
        let (o, _) = orchestrator(BackendRegistry::echo_only());
        assert_eq!(o.handle(&UserId::from("u"), "ping").await, "ping");
    }

    #[tokio::test]
    async fn reply_is_saved_and_fed_back_with_prompt() {
        let rec = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            reply: "pong",
        });
        let (o, _) = orchestrator(
            BackendRegistry::echo_only().with_provider(BackendKind::Gpt, rec.clone()),
        );
        let user = UserId::from("u");

        o.handle(&user, "/gpt").await;
        o.handle(&user, "/prompt You are terse.").await;
        assert_eq!(o.handle(&user, "first").await, "pong");
        o.writer().wait_idle().await;
        assert_eq!(o.handle(&user, "second").await, "pong");

        let seen = rec.seen.lock().unwrap();
        assert_eq!(
            seen[1],
            vec![
                Turn::system("You are terse."),
                Turn::user("first"),
                Turn::assistant("pong"),
                Turn::user("second"),
            ]
        );
    }

    #[tokio::test]
    async fn provider_failure_becomes_reply_text_without_history() {
        let (o, store) = orchestrator(
            BackendRegistry::echo_only().with_provider(BackendKind::Qwen, Arc::new(AlwaysFail)),
        );
        let user = UserId::from("u");
        o.handle(&user, "/qwen").await;

        let reply = o.handle(&user, "hi").await;
        assert!(reply.starts_with("fail request failed"), "{reply}");
        o.writer().wait_idle().await;
        assert_eq!(store.get("msg:qwen:u").await, None);
    }

    #[tokio::test]
    async fn overlapping_keywords_fail_construction() {
        let store = Arc::new(KeyValueStore::in_memory(Duration::from_secs(60)));
        let mut config = RelayConfig::default();
        config.commands.get_prompt = "/g".into();
        let ctx = TestContext {
            config,
            store,
            backends: Arc::new(BackendRegistry::echo_only()),
        };
        assert!(ConversationOrchestrator::from_context(&ctx).is_err());
    }
}
