pub mod error;
pub mod history;
pub mod types;
pub mod writer;

pub use error::SessionError;
pub use history::ConversationHistoryStore;
pub use types::ConversationKey;
pub use writer::{HistoryWriter, SaveJob};
