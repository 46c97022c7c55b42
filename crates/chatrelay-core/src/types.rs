use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender identity as reported by the messaging platform (e.g. a WeChat OpenID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The conversational backends a user can be assigned to.
///
/// The string form (`as_str`) is what gets persisted in assignment and
/// history keys, so it must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Gpt,
    Spark,
    Qwen,
    Gemini,
    /// Replies with the user's own text. Needs no credentials.
    Echo,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Gpt,
        BackendKind::Spark,
        BackendKind::Qwen,
        BackendKind::Gemini,
        BackendKind::Echo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt => "gpt",
            Self::Spark => "spark",
            Self::Qwen => "qwen",
            Self::Gemini => "gemini",
            Self::Echo => "echo",
        }
    }

    /// Whether the backend accepts a `system` turn at the head of the conversation.
    pub fn supports_prompt(&self) -> bool {
        matches!(self, Self::Gpt | Self::Spark | Self::Qwen)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "gpt" => Ok(Self::Gpt),
            "spark" => Ok(Self::Spark),
            "qwen" => Ok(Self::Qwen),
            "gemini" => Ok(Self::Gemini),
            "echo" => Ok(Self::Echo),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// What kind of inbound message the platform delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Voice,
    Event,
}

/// Inbound webhook message, already decoded from the platform's wire format.
///
/// Only `Text` messages reach the command dispatcher and the conversation
/// pipeline; the other kinds are answered by the gateway directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub text: String,
    /// Picture URL for `Image` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic_url: Option<String>,
    /// Event name for `Event` messages (`subscribe`, `click`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Menu key for `click` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_key: Option<String>,
}
