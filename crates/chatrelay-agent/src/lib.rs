pub mod bridge;
pub mod echo;
pub mod gemini;
pub mod openai;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod selector;

pub use bridge::{BridgeOutcome, Fingerprint, TimeoutBridge};
pub use pipeline::{ConversationOrchestrator, RelayContext};
pub use provider::{CompletionProvider, ProviderError};
pub use registry::BackendRegistry;
pub use selector::BackendSelector;
