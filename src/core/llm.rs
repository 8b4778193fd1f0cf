use crate::config::LLMConfig;
use crate::error::ApiError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Client for the chat-completions service
/// One attempt per call; the caller turns failures into an error message
pub struct ChatCompletionClient {
    client: Client,
    config: LLMConfig,
}

impl ChatCompletionClient {
    pub fn new(config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn complete(
        &self,
        api_key: &str,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<String, ApiError> {
        if api_key.is_empty() {
            return Err(ApiError::MissingCredential);
        }

        let request = ChatRequest {
            model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("[ChatCompletionClient] HTTP request failed: {}", e);
                ApiError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, response).await);
        }

        let chat_response = response.json::<ChatResponse>().await.map_err(|e| {
            tracing::warn!("[ChatCompletionClient] Failed to decode response body: {}", e);
            ApiError::InvalidResponse
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ApiError::InvalidResponse)
    }

    /// Check a key against the models listing
    pub async fn verify_key(&self, api_key: &str) -> Result<(), ApiError> {
        if api_key.is_empty() {
            return Err(ApiError::MissingCredential);
        }

        let response = self
            .client
            .get(&self.config.models_endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(error_for_status(status, response).await)
        }
    }
}

async fn error_for_status(status: StatusCode, response: reqwest::Response) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        tracing::warn!("[ChatCompletionClient] API rejected credentials");
        return ApiError::InvalidCredential;
    }

    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    let message = body
        .error
        .and_then(|e| e.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    tracing::warn!(
        "[ChatCompletionClient] API returned error status {}: {}",
        status,
        message
    );
    ApiError::Api {
        status: status.as_u16(),
        message,
    }
}
