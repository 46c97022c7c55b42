use chatrelay_core::{BackendKind, UserId};

/// Identifies one stored conversation: the same user talks to each backend
/// in a separate conversation with its own system prompt.
///
/// Key layouts:
/// - history: `msg:{backend}:{user}`
/// - prompt:  `prompt:{user}:{backend}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub backend: BackendKind,
    pub user: UserId,
}

impl ConversationKey {
    pub fn new(backend: BackendKind, user: impl Into<UserId>) -> Self {
        Self {
            backend,
            user: user.into(),
        }
    }

    pub fn history_key(&self) -> String {
        format!("msg:{}:{}", self.backend, self.user)
    }

    pub fn prompt_key(&self) -> String {
        format!("prompt:{}:{}", self.user, self.backend)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.backend, self.user)
    }
}
