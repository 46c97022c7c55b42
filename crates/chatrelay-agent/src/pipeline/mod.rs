//! Shared message pipeline, independent of the inbound surface.
//!
//! Hosts (the webhook gateway, tests) implement `RelayContext` and hand each
//! text message to `ConversationOrchestrator::handle`.

pub mod commands;
pub mod context;
pub mod process;

pub use commands::{CommandAction, CommandDispatcher, CommandTable};
pub use context::RelayContext;
pub use process::ConversationOrchestrator;
