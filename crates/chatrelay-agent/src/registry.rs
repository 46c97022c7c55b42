//! Backend registry: maps each `BackendKind` to a live provider built from
//! config, plus the well-known endpoint defaults for each backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::config::{OpenAiCompatConfig, ProvidersConfig};
use chatrelay_core::BackendKind;
use tracing::info;

use crate::echo::EchoProvider;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiCompatProvider;
use crate::provider::{CompletionProvider, ProviderError};

/// Endpoint defaults for a backend, used when config leaves them unset.
pub struct KnownBackend {
    pub kind: BackendKind,
    /// Base URL without trailing slash.
    pub base_url: &'static str,
    /// Path appended to `base_url` for chat completions.
    pub chat_path: &'static str,
    pub default_model: &'static str,
}

impl KnownBackend {
    pub fn endpoint(&self, base_url: Option<&str>) -> String {
        let base = base_url.unwrap_or(self.base_url).trim_end_matches('/');
        format!("{}{}", base, self.chat_path)
    }
}

pub const KNOWN_BACKENDS: &[KnownBackend] = &[
    KnownBackend {
        kind: BackendKind::Gpt,
        base_url: "https://api.openai.com",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-4o-mini",
    },
    KnownBackend {
        kind: BackendKind::Qwen,
        base_url: "https://dashscope.aliyuncs.com/compatible-mode",
        chat_path: "/v1/chat/completions",
        default_model: "qwen-plus",
    },
    KnownBackend {
        kind: BackendKind::Spark,
        base_url: "https://spark-api-open.xf-yun.com",
        chat_path: "/v1/chat/completions",
        default_model: "generalv3.5",
    },
    KnownBackend {
        kind: BackendKind::Gemini,
        base_url: "https://generativelanguage.googleapis.com",
        chat_path: "",
        default_model: "gemini-1.5-flash",
    },
];

pub fn known_backend(kind: BackendKind) -> Option<&'static KnownBackend> {
    KNOWN_BACKENDS.iter().find(|b| b.kind == kind)
}

/// Live providers keyed by backend. Echo is always present.
pub struct BackendRegistry {
    providers: HashMap<BackendKind, Arc<dyn CompletionProvider>>,
    missing: HashMap<BackendKind, String>,
}

impl BackendRegistry {
    /// Registry with only the echo backend. Every other backend reports as
    /// not configured until a provider is added with [`with_provider`](Self::with_provider).
    pub fn echo_only() -> Self {
        let mut providers: HashMap<BackendKind, Arc<dyn CompletionProvider>> = HashMap::new();
        providers.insert(BackendKind::Echo, Arc::new(EchoProvider));
        let missing = BackendKind::ALL
            .into_iter()
            .filter(|k| *k != BackendKind::Echo)
            .map(|k| (k, format!("{k} is not configured")))
            .collect();
        Self { providers, missing }
    }

    /// Build every backend whose credentials are present.
    ///
    /// Backends failing `ProvidersConfig::check` are recorded with the check
    /// message so `check` can report it to the user later.
    pub fn from_config(cfg: &ProvidersConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
            .build()?;

        let mut registry = Self::echo_only();
        for kind in BackendKind::ALL {
            if kind == BackendKind::Echo {
                continue;
            }
            if let Err(msg) = cfg.check(kind) {
                registry.missing.insert(kind, msg);
                continue;
            }
            let Some(provider) = build_provider(kind, cfg, client.clone()) else {
                continue;
            };
            info!(backend = %kind, provider = provider.name(), "backend ready");
            registry = registry.with_provider(kind, provider);
        }
        Ok(registry)
    }

    /// Register (or replace) the provider for `kind`.
    pub fn with_provider(mut self, kind: BackendKind, provider: Arc<dyn CompletionProvider>) -> Self {
        self.missing.remove(&kind);
        self.providers.insert(kind, provider);
        self
    }

    /// Whether `kind` can serve requests. The error text is user-facing.
    pub fn check(&self, kind: BackendKind) -> Result<(), String> {
        if self.providers.contains_key(&kind) {
            return Ok(());
        }
        Err(self
            .missing
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| format!("{kind} is not configured")))
    }

    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(format!("{kind} is not configured")))
    }

    /// Configured backends in declaration order.
    pub fn configured(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }
}

fn build_provider(
    kind: BackendKind,
    cfg: &ProvidersConfig,
    client: reqwest::Client,
) -> Option<Arc<dyn CompletionProvider>> {
    let known = known_backend(kind)?;
    let openai_compat = |c: &OpenAiCompatConfig| -> Arc<dyn CompletionProvider> {
        Arc::new(OpenAiCompatProvider::new(
            kind.as_str(),
            client.clone(),
            c.api_key.clone(),
            known.endpoint(c.base_url.as_deref()),
            c.model.clone().unwrap_or_else(|| known.default_model.to_string()),
        ))
    };

    match kind {
        BackendKind::Gpt => cfg.gpt.as_ref().map(openai_compat),
        BackendKind::Qwen => cfg.qwen.as_ref().map(openai_compat),
        BackendKind::Spark => cfg.spark.as_ref().map(openai_compat),
        BackendKind::Gemini => cfg.gemini.as_ref().map(|c| {
            Arc::new(GeminiProvider::new(
                client.clone(),
                c.api_key.clone(),
                c.base_url.clone().unwrap_or_else(|| known.base_url.to_string()),
                c.model.clone().unwrap_or_else(|| known.default_model.to_string()),
            )) as Arc<dyn CompletionProvider>
        }),
        BackendKind::Echo => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::config::GeminiConfig;

    fn compat(key: &str) -> Option<OpenAiCompatConfig> {
        Some(OpenAiCompatConfig {
            api_key: key.to_string(),
            base_url: None,
            model: None,
        })
    }

    #[test]
    fn every_remote_backend_has_defaults() {
        for kind in BackendKind::ALL {
            if kind != BackendKind::Echo {
                assert!(known_backend(kind).is_some(), "{kind} has no defaults");
            }
        }
    }

    #[test]
    fn endpoint_honours_override_and_trims_slash() {
        let gpt = known_backend(BackendKind::Gpt).unwrap();
        assert_eq!(gpt.endpoint(None), "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            gpt.endpoint(Some("http://localhost:8000/")),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn unconfigured_backends_report_check_message() {
        let cfg = ProvidersConfig {
            gpt: compat("sk-test"),
            qwen: compat("  "),
            ..Default::default()
        };
        let reg = BackendRegistry::from_config(&cfg).unwrap();

        assert!(reg.check(BackendKind::Gpt).is_ok());
        assert!(reg.check(BackendKind::Echo).is_ok());
        let err = reg.check(BackendKind::Qwen).unwrap_err();
        assert!(err.contains("qwen"), "{err}");
        assert!(reg.check(BackendKind::Spark).unwrap_err().contains("spark"));
        assert_eq!(reg.configured(), vec![BackendKind::Gpt, BackendKind::Echo]);
    }

    #[test]
    fn gemini_is_built_from_its_own_section() {
        let cfg = ProvidersConfig {
            gemini: Some(GeminiConfig {
                api_key: "g-key".into(),
                base_url: None,
                model: Some("gemini-2.0-flash".into()),
            }),
            ..Default::default()
        };
        let reg = BackendRegistry::from_config(&cfg).unwrap();
        assert_eq!(reg.get(BackendKind::Gemini).unwrap().name(), "gemini");
    }

    #[test]
    fn with_provider_clears_missing_state() {
        let reg = BackendRegistry::echo_only();
        assert!(reg.check(BackendKind::Spark).is_err());
        let reg = reg.with_provider(BackendKind::Spark, Arc::new(EchoProvider));
        assert!(reg.check(BackendKind::Spark).is_ok());
    }
}
