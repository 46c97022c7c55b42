//! Replies for each inbound message kind.
//!
//! Only text reaches the command dispatcher and the conversation pipeline;
//! pictures, voice and menu events are answered here.

use chatrelay_agent::ConversationOrchestrator;
use chatrelay_core::config::RepliesConfig;
use chatrelay_core::{InboundMessage, MessageKind, UserId};
use tracing::{debug, info};

pub async fn reply_for(
    relay: &ConversationOrchestrator,
    replies: &RepliesConfig,
    msg: &InboundMessage,
) -> String {
    let user = UserId::from(msg.from.as_str());

    match msg.kind {
        // An empty reply reads as "not ready yet" to the platform, so every
        // branch below must answer with some text.
        MessageKind::Text if msg.text.trim().is_empty() => "please send some text".to_string(),
        MessageKind::Text => relay.handle(&user, &msg.text).await,
        MessageKind::Image => msg.pic_url.clone().unwrap_or_default(),
        MessageKind::Voice => "voice messages are not supported yet".to_string(),
        MessageKind::Event => match msg.event.as_deref() {
            Some("subscribe") => {
                info!(user = %user, "new subscriber");
                match &replies.subscribe {
                    Some(greeting) => format!("{greeting}\n{}", relay.help()),
                    None => relay.help().to_string(),
                }
            }
            Some("click") => {
                let key = msg.event_key.as_deref().unwrap_or_default();
                match replies.event_keys.get(key) {
                    Some(kind) => relay.selector().switch_backend(&user, *kind).await,
                    None => format!("unknown event key={key}"),
                }
            }
            other => {
                debug!(user = %user, event = ?other, "unsupported event");
                format!("unsupported event type: {}", other.unwrap_or("none"))
            }
        },
    }
}
