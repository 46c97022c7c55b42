use async_trait::async_trait;
use chatrelay_core::Turn;
use serde::Deserialize;
use tracing::debug;

use crate::provider::{check_status, CompletionProvider, ProviderError};

/// Client for any endpoint speaking the OpenAI chat-completions dialect.
///
/// GPT, Qwen (DashScope compatible mode) and Spark all use this adapter with
/// different base URLs and models.
pub struct OpenAiCompatProvider {
    name: String,
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        client: reqwest::Client,
        api_key: String,
        endpoint: String,
        model: String,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            api_key,
            endpoint,
            model,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let body = build_request_body(&self.model, turns);

        debug!(provider = %self.name, model = %self.model, turns = turns.len(), "sending completion request");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = check_status(&self.name, resp).await?;

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parse_response(api_resp)
    }
}

fn build_request_body(model: &str, turns: &[Turn]) -> serde_json::Value {
    // Roles map 1:1; a stored system prompt is already the first turn.
    let messages: Vec<serde_json::Value> = turns
        .iter()
        .map(|t| {
            serde_json::json!({
                "role": t.role,
                "content": t.text,
            })
        })
        .collect();

    serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": false,
    })
}

fn parse_response(resp: ApiResponse) -> Result<String, ProviderError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::Parse("response has no choices".to_string()))
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
