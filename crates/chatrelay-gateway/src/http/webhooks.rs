//! Webhook ingress endpoint: POST /webhooks/{source}.
//!
//! Each source is authenticated independently according to its `auth_mode`
//! in `RelayConfig::webhooks`. The body is an `InboundMessage`; the response
//! carries the reply text the platform should deliver.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chatrelay_core::config::WebhookAuthMode;
use chatrelay_core::InboundMessage;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

// ── Public handler ────────────────────────────────────────────────────────────

/// POST /webhooks/{source}
///
/// Returns 200 + `{reply, receipt_id}` on success, 401 on auth failure,
/// 404 for an unknown source and 400 for a malformed body. Conversation
/// failures are never HTTP errors: they arrive as reply text.
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source_cfg = state
        .host
        .config
        .webhooks
        .sources
        .iter()
        .find(|s| s.name == source)
        .ok_or_else(|| {
            warn!(source = %source, "unknown webhook source");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "unknown webhook source"})),
            )
        })?;

    match &source_cfg.auth_mode {
        WebhookAuthMode::HmacSha256 => {
            verify_hmac_sha256(&headers, &body, source_cfg.secret.as_deref())
                .map_err(|e| auth_error(&e))?;
        }
        WebhookAuthMode::BearerToken => {
            verify_bearer_token(&headers, source_cfg.secret.as_deref())
                .map_err(|e| auth_error(&e))?;
        }
        WebhookAuthMode::None => {}
    }

    let msg: InboundMessage = serde_json::from_slice(&body).map_err(|e| {
        warn!(source = %source, error = %e, "invalid message body");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid message body", "reason": e.to_string()})),
        )
    })?;

    let receipt_id = uuid::Uuid::new_v4().to_string();
    info!(source = %source, receipt_id = %receipt_id, from = %msg.from, kind = ?msg.kind, "message arrived");

    let reply =
        super::inbound::reply_for(&state.relay, &state.host.config.replies, &msg).await;

    info!(receipt_id = %receipt_id, empty = reply.is_empty(), "reply ready");
    Ok(Json(json!({"reply": reply, "receipt_id": receipt_id})))
}

// ── Auth helpers ──────────────────────────────────────────────────────────────

/// Verify HMAC-SHA256 over the raw body: `sha256=<hex>` in X-Hub-Signature-256.
fn verify_hmac_sha256(
    headers: &HeaderMap,
    body: &Bytes,
    secret: Option<&str>,
) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no HMAC secret configured for this source".to_string())?;

    let sig_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Hub-Signature-256 header".to_string())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Hub-Signature-256 is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

/// Verify a static bearer token in the `Authorization: Bearer <token>` header.
fn verify_bearer_token(headers: &HeaderMap, secret: Option<&str>) -> Result<(), String> {
    let expected =
        secret.ok_or_else(|| "no bearer token configured for this source".to_string())?;

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Authorization header".to_string())?
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer scheme".to_string())?;

    if token == expected {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

// ── Error helpers ─────────────────────────────────────────────────────────────

fn auth_error(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason = %reason, "webhook authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "authentication failed", "reason": reason})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{build_router, AppState};
    use axum::body::Body;
    use axum::http::Request;
    use chatrelay_agent::BackendRegistry;
    use chatrelay_core::config::WebhookSourceConfig;
    use chatrelay_core::RelayConfig;
    use chatrelay_store::KeyValueStore;
    use std::time::Duration;
    use tower::ServiceExt;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn hmac_accepts_valid_signature() {
        let body = Bytes::from_static(br#"{"from":"u","text":"hi"}"#);
        let mut headers = HeaderMap::new();
        headers.insert("x-hub-signature-256", sign("s3cret", &body).parse().unwrap());
        assert!(verify_hmac_sha256(&headers, &body, Some("s3cret")).is_ok());
    }

    #[test]
    fn hmac_rejects_wrong_secret_and_missing_header() {
        let body = Bytes::from_static(b"{}");
        let mut headers = HeaderMap::new();
        assert!(verify_hmac_sha256(&headers, &body, Some("k")).is_err());
        headers.insert("x-hub-signature-256", sign("other", &body).parse().unwrap());
        assert_eq!(
            verify_hmac_sha256(&headers, &body, Some("k")).unwrap_err(),
            "HMAC signature mismatch"
        );
        assert!(verify_hmac_sha256(&headers, &body, None).is_err());
    }

    #[test]
    fn bearer_token_checks() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer tok".parse().unwrap());
        assert!(verify_bearer_token(&headers, Some("tok")).is_ok());
        assert!(verify_bearer_token(&headers, Some("other")).is_err());

        headers.insert("authorization", "Basic tok".parse().unwrap());
        assert!(verify_bearer_token(&headers, Some("tok")).is_err());
    }

    fn router(auth_mode: WebhookAuthMode, secret: Option<&str>) -> axum::Router {
        let mut config = RelayConfig::default();
        config.webhooks.sources.push(WebhookSourceConfig {
            name: "wechat".into(),
            secret: secret.map(str::to_string),
            auth_mode,
        });
        let state = AppState::new(
            config,
            Arc::new(KeyValueStore::in_memory(Duration::from_secs(60))),
            Arc::new(BackendRegistry::echo_only()),
        )
        .unwrap();
        build_router(Arc::new(state))
    }

    async fn post(router: axum::Router, path: &str, auth: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut req = Request::post(path).header("content-type", "application/json");
        if let Some(auth) = auth {
            req = req.header("authorization", auth);
        }
        let resp = router
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn text_message_gets_reply() {
        let app = router(WebhookAuthMode::None, None);
        let (status, body) = post(app, "/webhooks/wechat", None, r#"{"from":"u1","text":"ping"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "ping");
        assert!(body["receipt_id"].is_string());
    }

    #[tokio::test]
    async fn unknown_source_is_404() {
        let app = router(WebhookAuthMode::None, None);
        let (status, _) = post(app, "/webhooks/slack", None, r#"{"from":"u1"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bearer_source_rejects_missing_token() {
        let app = router(WebhookAuthMode::BearerToken, Some("tok"));
        let (status, body) = post(app.clone(), "/webhooks/wechat", None, r#"{"from":"u1"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "authentication failed");

        let (status, _) = post(app, "/webhooks/wechat", Some("Bearer tok"), r#"{"from":"u1","text":"x"}"#).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let app = router(WebhookAuthMode::None, None);
        let (status, _) = post(app, "/webhooks/wechat", None, r#"{"text":"no sender"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
