use std::collections::HashMap;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::BackendKind;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
/// Most messaging webhooks give up after 5 s; leave headroom for the network.
pub const DEFAULT_REPLY_DEADLINE_MS: u64 = 4_500;
pub const DEFAULT_TTL_SECS: u64 = 30 * 60;

/// Top-level config (chatrelay.toml + CHATRELAY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub replies: RepliesConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Conversation pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Backend used when a user has no (unexpired) assignment.
    #[serde(default = "default_backend")]
    pub default_backend: BackendKind,
    /// Hard reply deadline of the upstream webhook.
    #[serde(default = "default_reply_deadline_ms")]
    pub reply_deadline_ms: u64,
    /// Upper bound for a completion that already missed the reply deadline.
    #[serde(default = "default_work_ceiling_secs")]
    pub work_ceiling_secs: u64,
    /// Reply sent when the deadline passes first. Empty makes the platform retry.
    #[serde(default)]
    pub placeholder: String,
    /// Most recent non-system turns kept per conversation.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// Concurrent background history writes.
    #[serde(default = "default_writer_concurrency")]
    pub writer_concurrency: usize,
    /// Pending history writes before new ones are dropped.
    #[serde(default = "default_writer_queue")]
    pub writer_queue: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            reply_deadline_ms: DEFAULT_REPLY_DEADLINE_MS,
            work_ceiling_secs: default_work_ceiling_secs(),
            placeholder: String::new(),
            max_history_turns: default_max_history_turns(),
            writer_concurrency: default_writer_concurrency(),
            writer_queue: default_writer_queue(),
        }
    }
}

impl RelaySettings {
    pub fn reply_deadline(&self) -> Duration {
        Duration::from_millis(self.reply_deadline_ms)
    }

    pub fn work_ceiling(&self) -> Duration {
        Duration::from_secs(self.work_ceiling_secs)
    }
}

/// Key-value persistence. Without `redis_url` or `sqlite_path` the relay runs
/// on the in-process cache alone and loses state on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub redis_url: Option<String>,
    pub sqlite_path: Option<String>,
    /// TTL applied when a caller passes a zero TTL.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// How long a value fetched from the remote store is mirrored in-process.
    #[serde(default = "default_mirror_ttl_secs")]
    pub mirror_ttl_secs: u64,
    #[serde(default = "default_history_ttl_secs")]
    pub history_ttl_secs: u64,
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            sqlite_path: None,
            default_ttl_secs: DEFAULT_TTL_SECS,
            mirror_ttl_secs: default_mirror_ttl_secs(),
            history_ttl_secs: default_history_ttl_secs(),
            pending_ttl_secs: default_pending_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl StoreConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn mirror_ttl(&self) -> Duration {
        Duration::from_secs(self.mirror_ttl_secs)
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub gpt: Option<OpenAiCompatConfig>,
    pub spark: Option<OpenAiCompatConfig>,
    pub qwen: Option<OpenAiCompatConfig>,
    pub gemini: Option<GeminiConfig>,
    /// HTTP timeout for a single completion request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gpt: None,
            spark: None,
            qwen: None,
            gemini: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProvidersConfig {
    /// Check that `kind` has the credentials it needs.
    ///
    /// The error string is shown to the end user verbatim, so it names the
    /// backend and the missing setting.
    pub fn check(&self, kind: BackendKind) -> std::result::Result<(), String> {
        let key = match kind {
            BackendKind::Echo => return Ok(()),
            BackendKind::Gpt => self.gpt.as_ref().map(|c| c.api_key.as_str()),
            BackendKind::Spark => self.spark.as_ref().map(|c| c.api_key.as_str()),
            BackendKind::Qwen => self.qwen.as_ref().map(|c| c.api_key.as_str()),
            BackendKind::Gemini => self.gemini.as_ref().map(|c| c.api_key.as_str()),
        };
        match key {
            Some(k) if !k.trim().is_empty() => Ok(()),
            _ => Err(format!(
                "{kind} is not configured: set providers.{kind}.api_key"
            )),
        }
    }
}

/// Endpoint speaking the OpenAI chat-completions dialect (OpenAI, DashScope
/// compatible mode, Spark HTTP API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompatConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Command keywords. Matching is by prefix, so no keyword may be a prefix of another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_cmd_help")]
    pub help: String,
    #[serde(default = "default_cmd_gpt")]
    pub gpt: String,
    #[serde(default = "default_cmd_spark")]
    pub spark: String,
    #[serde(default = "default_cmd_qwen")]
    pub qwen: String,
    #[serde(default = "default_cmd_gemini")]
    pub gemini: String,
    #[serde(default = "default_cmd_echo")]
    pub echo: String,
    #[serde(default = "default_cmd_prompt")]
    pub set_prompt: String,
    #[serde(default = "default_cmd_rm_prompt")]
    pub remove_prompt: String,
    #[serde(default = "default_cmd_get_prompt")]
    pub get_prompt: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            help: default_cmd_help(),
            gpt: default_cmd_gpt(),
            spark: default_cmd_spark(),
            qwen: default_cmd_qwen(),
            gemini: default_cmd_gemini(),
            echo: default_cmd_echo(),
            set_prompt: default_cmd_prompt(),
            remove_prompt: default_cmd_rm_prompt(),
            get_prompt: default_cmd_get_prompt(),
        }
    }
}

impl CommandsConfig {
    /// Keyword that switches the sender to `kind`.
    pub fn switch_keyword(&self, kind: BackendKind) -> &str {
        match kind {
            BackendKind::Gpt => &self.gpt,
            BackendKind::Spark => &self.spark,
            BackendKind::Qwen => &self.qwen,
            BackendKind::Gemini => &self.gemini,
            BackendKind::Echo => &self.echo,
        }
    }

    /// Help text listing every command, used when `replies.help` is unset.
    pub fn help_text(&self) -> String {
        let mut out = String::from("Commands:\n");
        out.push_str(&format!("{} - show this help\n", self.help));
        for kind in BackendKind::ALL {
            out.push_str(&format!("{} - talk to {}\n", self.switch_keyword(kind), kind));
        }
        out.push_str(&format!("{} <text> - set the system prompt\n", self.set_prompt));
        out.push_str(&format!("{} - remove the system prompt\n", self.remove_prompt));
        out.push_str(&format!("{} - show the system prompt", self.get_prompt));
        out
    }
}

/// Fixed reply texts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepliesConfig {
    pub help: Option<String>,
    pub subscribe: Option<String>,
    /// Backend name -> welcome text sent after a successful switch.
    #[serde(default)]
    pub welcome: HashMap<String, String>,
    /// Menu click event key -> backend to switch to.
    #[serde(default)]
    pub event_keys: HashMap<String, BackendKind>,
}

impl RepliesConfig {
    pub fn welcome_for(&self, kind: BackendKind) -> String {
        self.welcome
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| format!("I'm {kind}, let's chat!"))
    }
}

/// Authentication mode for an incoming webhook source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    /// HMAC-SHA256 over the raw request body (`X-Hub-Signature-256: sha256=<hex>`).
    HmacSha256,
    /// Static bearer token in the Authorization header.
    BearerToken,
    /// No authentication. Only for trusted networks.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSourceConfig {
    /// Route segment, e.g. "wechat" -> POST /webhooks/wechat.
    pub name: String,
    pub secret: Option<String>,
    pub auth_mode: WebhookAuthMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub sources: Vec<WebhookSourceConfig>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_backend() -> BackendKind {
    BackendKind::Echo
}
fn default_reply_deadline_ms() -> u64 {
    DEFAULT_REPLY_DEADLINE_MS
}
fn default_work_ceiling_secs() -> u64 {
    120
}
fn default_max_history_turns() -> usize {
    20
}
fn default_writer_concurrency() -> usize {
    4
}
fn default_writer_queue() -> usize {
    256
}
fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}
fn default_mirror_ttl_secs() -> u64 {
    60
}
fn default_history_ttl_secs() -> u64 {
    10 * 60
}
fn default_pending_ttl_secs() -> u64 {
    5 * 60
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_cmd_help() -> String {
    "/help".to_string()
}
fn default_cmd_gpt() -> String {
    "/gpt".to_string()
}
fn default_cmd_spark() -> String {
    "/spark".to_string()
}
fn default_cmd_qwen() -> String {
    "/qwen".to_string()
}
fn default_cmd_gemini() -> String {
    "/gemini".to_string()
}
fn default_cmd_echo() -> String {
    "/echo".to_string()
}
fn default_cmd_prompt() -> String {
    "/prompt".to_string()
}
fn default_cmd_rm_prompt() -> String {
    "/cpt".to_string()
}
fn default_cmd_get_prompt() -> String {
    "/getpt".to_string()
}

impl RelayConfig {
    /// Load config from a TOML file with CHATRELAY_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `CHATRELAY_PROVIDERS__GPT__API_KEY=sk-...`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RelayConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHATRELAY_").split("__"))
            .extract()
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chatrelay/chatrelay.toml", home)
}
