use async_trait::async_trait;
use chatrelay_core::{Role, Turn};

use crate::provider::{CompletionProvider, ProviderError};

/// Replies with the newest user turn. Needs no credentials, so it is the
/// fallback backend and handy for wiring checks.
pub struct EchoProvider;

#[async_trait]
impl CompletionProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        Ok(turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.clone())
            .unwrap_or_default())
    }
}
