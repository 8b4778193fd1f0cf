//! Chat history core: messages, persistence, retries and the completions client

pub mod credentials;
pub mod history;
pub mod llm;
pub mod message;
pub mod probe;
pub mod retry_queue;

pub use credentials::Credentials;
pub use history::{AppendOutcome, HistoryRepository};
pub use llm::{ChatCompletionClient, ChatMessage};
pub use message::{Message, MessageKind};
pub use probe::StorageProber;
pub use retry_queue::{PendingEntry, PersistTarget, RetryQueue};
