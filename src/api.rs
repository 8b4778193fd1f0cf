//! Chat session facade
//!
//! This module ties the history repository, the storage prober, the
//! coordinator and the completions client together the way a chat window
//! uses them: probe, load, send, clear.

use crate::actors::{CoordinatorHandle, StorageStatus};
use crate::config::Settings;
use crate::core::{
    AppendOutcome, ChatCompletionClient, ChatMessage, Credentials, HistoryRepository, Message,
    MessageKind, StorageProber,
};
use crate::error::ApiError;
use crate::storage::KeyValueStore;
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

pub const WELCOME_MESSAGE: &str =
    "Hello! I'm your Tax Assistant AI. How can I help you with your tax questions today?";
pub const CLEARED_MESSAGE: &str = "Chat history cleared. How can I help you?";

pub const TAX_SYSTEM_PROMPT: &str = "You are a helpful tax assistant AI. Your task is to:
1. Analyze user questions about taxes and tax-related topics
2. Provide clear, accurate information about tax concepts
3. Guide users through tax-related processes step by step
4. Explain complex tax terms in simple language
5. Help identify relevant tax forms and requirements";

/// One chat window's view of the conversation
pub struct ChatSession {
    store: Arc<dyn KeyValueStore>,
    history: HistoryRepository,
    prober: StorageProber,
    coordinator: CoordinatorHandle,
    client: ChatCompletionClient,
    settings: Settings,
    transcript: Vec<Message>,
    // Set once storage has passed a probe
    started: bool,
}

impl ChatSession {
    pub fn new(store: Arc<dyn KeyValueStore>, coordinator: CoordinatorHandle, settings: Settings) -> Self {
        Self {
            history: HistoryRepository::new(
                store.clone(),
                settings.history.clone(),
                settings.queue.clone(),
            ),
            prober: StorageProber::new(store.clone()),
            client: ChatCompletionClient::new(settings.llm.clone()),
            store,
            coordinator,
            settings,
            transcript: Vec::new(),
            started: false,
        }
    }

    /// Messages currently shown, including ones that are not persisted
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn history(&self) -> &HistoryRepository {
        &self.history
    }

    /// Probe storage and load the saved conversation
    /// The whole sequence is retried `session.init_attempts` times
    pub async fn start(&mut self) -> Result<&[Message]> {
        let attempts = self.settings.session.init_attempts.max(1);
        let retry_delay = Duration::from_millis(self.settings.session.init_retry_delay_ms);

        for attempt in 1..=attempts {
            tracing::debug!("[ChatSession] Attempting initialization ({}/{})", attempt, attempts);
            match self.try_start().await {
                Ok(()) => return Ok(&self.transcript),
                Err(e) => {
                    tracing::warn!("[ChatSession] Initialization attempt {} failed: {}", attempt, e);
                    if attempt < attempts {
                        sleep(retry_delay).await;
                    }
                }
            }
        }

        bail!("Failed to initialize chat session after {} attempts", attempts)
    }

    async fn try_start(&mut self) -> Result<()> {
        sleep(Duration::from_millis(self.settings.session.startup_delay_ms)).await;

        let probe = &self.settings.probe;
        if !self.prober.probe(probe.max_attempts, probe.delay()).await {
            bail!("Storage not available after multiple attempts");
        }

        let history = self.history.load().await;
        self.transcript = if history.is_empty() {
            vec![Message::assistant(WELCOME_MESSAGE)]
        } else {
            history
        };

        self.started = true;
        tracing::info!(
            "[ChatSession] Started with {} messages",
            self.transcript.len()
        );
        Ok(())
    }

    /// Send a user message and return what should be shown for it
    ///
    /// Completion failures become `error` messages rather than errors;
    /// persistence failures are handled by the retry queue. Nothing is
    /// written until `start` has succeeded.
    pub async fn send(&mut self, text: &str) -> Vec<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if !self.started {
            tracing::warn!("[ChatSession] Ignoring message sent before storage was confirmed");
            return Vec::new();
        }

        let mut shown = vec![self.record(text, MessageKind::User).await];
        let status = self.record("Processing your message...", MessageKind::System).await;
        tracing::debug!("{}", status.text);

        let reply = match self.ask(text).await {
            Ok(content) => self.record(content, MessageKind::Assistant).await,
            Err(ApiError::MissingCredential) => {
                self.record(ApiError::MissingCredential.to_string(), MessageKind::Error)
                    .await
            }
            Err(e) => {
                tracing::error!("[ChatSession] Error processing message: {}", e);
                self.record(format!("Error: {}", e), MessageKind::Error).await
            }
        };
        self.transcript.retain(|m| m.kind != MessageKind::System);

        shown.push(reply);
        shown
    }

    async fn ask(&self, text: &str) -> Result<String, ApiError> {
        let credentials = Credentials::load(self.store.as_ref(), &self.settings.llm.model).await?;

        if !credentials.has_api_key() {
            return Err(ApiError::MissingCredential);
        }

        let messages = vec![ChatMessage::system(TAX_SYSTEM_PROMPT), ChatMessage::user(text)];
        self.client
            .complete(&credentials.api_key, &credentials.model, messages)
            .await
    }

    async fn record(&mut self, text: impl Into<String>, kind: MessageKind) -> Message {
        if kind == MessageKind::System {
            self.transcript.retain(|m| m.kind != MessageKind::System);
        }

        let outcome = self.history.append(text, kind).await;
        if let AppendOutcome::Queued(message) = &outcome {
            tracing::warn!("[ChatSession] Message {} queued for a later save", message.id);
        }

        let message = outcome.into_message();
        self.transcript.push(message.clone());
        message
    }

    /// Ask the coordinator to clear history, then confirm locally
    pub async fn clear(&mut self) -> Result<Message> {
        let response = self.coordinator.clear_history().await;
        if !response.success {
            bail!(
                "Error clearing chat history: {}",
                response.error.unwrap_or_else(|| "Failed to clear storage".to_string())
            );
        }

        self.history.queue().clear();
        self.transcript.clear();

        if !self.history.load().await.is_empty() {
            bail!("Failed to verify storage clearance");
        }

        let notice = Message::assistant(CLEARED_MESSAGE);
        self.transcript.push(notice.clone());
        Ok(notice)
    }

    pub async fn check_storage(&self) -> StorageStatus {
        self.coordinator.check_storage().await
    }

    pub async fn verify_key(&self) -> Result<()> {
        let credentials = Credentials::load(self.store.as_ref(), &self.settings.llm.model).await?;
        self.client.verify_key(&credentials.api_key).await?;
        Ok(())
    }

    /// Wait for queued messages to be saved, up to `limit`
    /// Returns false if messages are still pending
    pub async fn flush(&self, limit: Duration) -> bool {
        let queue = self.history.queue();
        tokio::time::timeout(limit, queue.wait_idle()).await.is_ok() && queue.is_empty()
    }
}
