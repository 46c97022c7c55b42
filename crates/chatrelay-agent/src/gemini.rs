use async_trait::async_trait;
use chatrelay_core::{Role, Turn};
use serde::Deserialize;
use tracing::debug;

use crate::provider::{check_status, CompletionProvider, ProviderError};

/// Google Gemini `generateContent` client.
///
/// Gemini has no system role here, so system turns are not sent; prompts are
/// not offered for this backend anyway.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: String, base_url: String, model: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let body = build_request_body(turns);

        debug!(model = %self.model, turns = turns.len(), "sending request to Gemini");

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp = check_status("gemini", resp).await?;

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parse_response(api_resp)
    }
}

fn build_request_body(turns: &[Turn]) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = turns
        .iter()
        .filter_map(|t| {
            let role = match t.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System => return None,
            };
            Some(serde_json::json!({
                "role": role,
                "parts": [{ "text": t.text }],
            }))
        })
        .collect();

    serde_json::json!({ "contents": contents })
}

fn parse_response(resp: ApiResponse) -> Result<String, ProviderError> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("response has no candidates".to_string()))?;

    Ok(candidate
        .content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join(""))
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turns_are_not_sent_and_roles_are_mapped() {
        let body = build_request_body(&[
            Turn::system("ignored"),
            Turn::user("hi"),
            Turn::assistant("hello"),
        ]);
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "hi");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn parse_joins_text_parts() {
        let resp: ApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(parse_response(resp).unwrap(), "Hello");
    }

    #[test]
    fn url_includes_model() {
        let p = GeminiProvider::new(
            reqwest::Client::new(),
            "k".into(),
            "https://generativelanguage.googleapis.com/".into(),
            "gemini-1.5-flash".into(),
        );
        assert_eq!(
            p.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
