//! Command interception, ahead of the completion pipeline.
//!
//! A message is a command when it starts with a registered keyword; the rest
//! of the message, trimmed, is the parameter. Keywords are checked at startup
//! so that no keyword is a prefix of another and every match is unambiguous.

use std::sync::Arc;

use chatrelay_core::config::{CommandsConfig, RepliesConfig};
use chatrelay_core::{BackendKind, RelayError, UserId};
use chatrelay_sessions::{ConversationHistoryStore, ConversationKey};
use tracing::info;

use crate::selector::BackendSelector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Help,
    Switch(BackendKind),
    SetPrompt,
    RemovePrompt,
    GetPrompt,
}

/// Keyword table with prefix-free keywords.
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: Vec<(String, CommandAction)>,
}

impl CommandTable {
    pub fn new(entries: Vec<(String, CommandAction)>) -> Result<Self, RelayError> {
        for (i, (a, _)) in entries.iter().enumerate() {
            if a.is_empty() {
                return Err(RelayError::Config("command keyword must not be empty".into()));
            }
            for (b, _) in &entries[i + 1..] {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(RelayError::Config(format!(
                        "command keywords `{a}` and `{b}` overlap: one is a prefix of the other"
                    )));
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn from_config(cmds: &CommandsConfig) -> Result<Self, RelayError> {
        let mut entries = vec![(cmds.help.clone(), CommandAction::Help)];
        for kind in BackendKind::ALL {
            entries.push((cmds.switch_keyword(kind).to_string(), CommandAction::Switch(kind)));
        }
        entries.push((cmds.set_prompt.clone(), CommandAction::SetPrompt));
        entries.push((cmds.remove_prompt.clone(), CommandAction::RemovePrompt));
        entries.push((cmds.get_prompt.clone(), CommandAction::GetPrompt));
        Self::new(entries)
    }

    /// Find the keyword `message` starts with and return its action and the
    /// trimmed remainder.
    pub fn match_command<'m>(&self, message: &'m str) -> Option<(CommandAction, &'m str)> {
        self.entries.iter().find_map(|(keyword, action)| {
            message
                .strip_prefix(keyword.as_str())
                .map(|rest| (*action, rest.trim()))
        })
    }
}

/// Runs matched commands against the selector and history store.
pub struct CommandDispatcher {
    table: CommandTable,
    selector: Arc<BackendSelector>,
    history: Arc<ConversationHistoryStore>,
    help: String,
}

impl CommandDispatcher {
    pub fn new(
        table: CommandTable,
        selector: Arc<BackendSelector>,
        history: Arc<ConversationHistoryStore>,
        help: String,
    ) -> Self {
        Self {
            table,
            selector,
            history,
            help,
        }
    }

    /// Help text: the configured override, else one generated from the keywords.
    pub fn help_text(cmds: &CommandsConfig, replies: &RepliesConfig) -> String {
        replies.help.clone().unwrap_or_else(|| cmds.help_text())
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns `Some(reply)` if `message` was a command, `None` if it should go
    /// to the completion pipeline.
    pub async fn dispatch(&self, user: &UserId, message: &str) -> Option<String> {
        let (action, param) = self.table.match_command(message)?;
        info!(user = %user, ?action, "command");

        let reply = match action {
            CommandAction::Help => self.help.clone(),
            CommandAction::Switch(kind) => self.selector.switch_backend(user, kind).await,
            CommandAction::SetPrompt => {
                let kind = self.selector.resolve_backend(user).await;
                match prompt_support(kind) {
                    Err(msg) => msg,
                    Ok(()) => {
                        let key = ConversationKey::new(kind, user.clone());
                        self.history.set_prompt(&key, param).await;
                        format!("{kind} prompt set")
                    }
                }
            }
            CommandAction::RemovePrompt => {
                let kind = self.selector.resolve_backend(user).await;
                let key = ConversationKey::new(kind, user.clone());
                self.history.remove_prompt(&key).await;
                format!("{kind} prompt removed")
            }
            CommandAction::GetPrompt => {
                let kind = self.selector.resolve_backend(user).await;
                let key = ConversationKey::new(kind, user.clone());
                match self.history.get_prompt(&key).await {
                    Some(p) => format!("{kind} prompt: {p}"),
                    None => format!("{kind} has no prompt set"),
                }
            }
        };
        Some(reply)
    }
}

fn prompt_support(kind: BackendKind) -> Result<(), String> {
    if kind.supports_prompt() {
        return Ok(());
    }
    Err(RelayError::Unsupported {
        backend: kind.to_string(),
        operation: "system prompts".to_string(),
    }
    .to_string())
}
