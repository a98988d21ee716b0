//! OpenAI-compatible chat-completions client with SSE streaming support.

use std::time::Duration;

use gt_protocol::{ChatMessage, ChatRequest, Role, ThinkingConfig};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::decoder::{decode_sse, EventStream};

pub const DEFAULT_HOST: &str = "https://api.openai.com";
pub const DEFAULT_API_PATH: &str = "/v1";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Client for `POST {host}{api_path}/chat/completions` and `GET {host}{api_path}/models`.
#[derive(Clone)]
pub struct ChatClient {
    api_key: String,
    host: String,
    api_path: String,
    timeout: Duration,
    http: Client,
}

/// Build an HTTP client with appropriate timeouts and connection limits.
fn build_http_client(timeout: Duration) -> Result<Client, ChatError> {
    Ok(Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .read_timeout(timeout)
        .pool_max_idle_per_host(2)
        .build()?)
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        Ok(Self {
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            timeout,
            http: build_http_client(timeout)?,
        })
    }

    /// Point the client at another OpenAI-compatible host. A trailing slash is dropped.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.set_host(host);
        self
    }

    /// Path prefix between host and endpoint (`/v1` for OpenAI, empty for some proxies).
    pub fn with_api_path(mut self, api_path: impl Into<String>) -> Self {
        self.api_path = api_path.into().trim_end_matches('/').to_string();
        self
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into().trim_end_matches('/').to_string();
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the request timeout. The HTTP client is rebuilt to apply it.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), ChatError> {
        self.http = build_http_client(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}{}/chat/completions", self.host, self.api_path)
    }

    pub fn models_endpoint(&self) -> String {
        format!("{}{}/models", self.host, self.api_path)
    }

    /// Send a streaming request and return the decoded chunk stream.
    ///
    /// Errors before the first byte (connection, 4xx/5xx) are returned here;
    /// errors after that arrive as a terminal item of the stream.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<EventStream, ChatError> {
        let response = self.post_chat(request, true).await?;
        Ok(decode_sse(Box::pin(response.bytes_stream())))
    }

    /// Send a non-streaming request and return the raw completion JSON.
    pub async fn complete(&self, request: &ChatRequest) -> Result<Value, ChatError> {
        let response = self.post_chat(request, false).await?;
        let body = response.text().await.map_err(|e| self.map_reqwest(e))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch the model ids offered by the host.
    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let response = self
            .http
            .get(self.models_endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;
        let response = check_status(response).await?;
        let models: ModelList = response.json().await.map_err(|e| self.map_reqwest(e))?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    async fn post_chat(&self, request: &ChatRequest, stream: bool) -> Result<Response, ChatError> {
        let body = ApiRequest::from_request(request, stream);
        tracing::debug!(
            endpoint = %self.chat_endpoint(),
            model = %request.model,
            messages = request.messages.len(),
            stream,
            "sending chat request"
        );

        let mut builder = self
            .http
            .post(self.chat_endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);
        // Streaming bodies may legitimately outlive the timeout; the read
        // timeout on the client bounds the gap between chunks instead.
        if !stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await.map_err(|e| self.map_reqwest(e))?;
        check_status(response).await
    }

    fn map_reqwest(&self, e: reqwest::Error) -> ChatError {
        if e.is_timeout() {
            ChatError::Timeout(self.timeout)
        } else {
            ChatError::Http(e)
        }
    }
}

/// Turn non-success responses into `ChatError::Api`, preferring the
/// server's `error.message` over the raw body.
async fn check_status(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(status, &body);
    tracing::error!(status = status.as_u16(), %message, "chat API returned an error");
    Err(ChatError::Api {
        status: status.as_u16(),
        message,
    })
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            }
        })
}

/// Extract `choices[0].message.content` from a non-streaming completion.
pub fn completion_text(response: &Value) -> Option<&str> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

// API request/response types

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<&'a ThinkingConfig>,
}

/// Wire form of a history turn. Citations stay local.
#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> ApiRequest<'a> {
    fn from_request(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            thinking: request.thinking.as_ref(),
        }
    }
}

impl<'a> From<&'a ChatMessage> for ApiMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role,
            content: &message.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ChatClient {
        ChatClient::new("sk-test", Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn default_endpoints() {
        let c = client();
        assert_eq!(c.chat_endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(c.models_endpoint(), "https://api.openai.com/v1/models");
    }

    #[test]
    fn custom_host_trailing_slash_dropped() {
        let c = client().with_host("http://localhost:4000/");
        assert_eq!(c.host(), "http://localhost:4000");
        assert_eq!(c.chat_endpoint(), "http://localhost:4000/v1/chat/completions");
    }

    #[test]
    fn timeout_can_be_changed() {
        let mut c = client();
        c.set_timeout(Duration::from_secs(90)).unwrap();
        assert_eq!(c.timeout(), Duration::from_secs(90));
    }

    #[test]
    fn empty_api_path() {
        let c = client().with_host("http://proxy").with_api_path("");
        assert_eq!(c.chat_endpoint(), "http://proxy/chat/completions");
        assert_eq!(c.models_endpoint(), "http://proxy/models");
    }

    #[test]
    fn request_body_omits_citations_and_unset_options() {
        let request = ChatRequest::new(
            "gpt-4o",
            vec![
                ChatMessage::system("be brief"),
                ChatMessage::assistant("answer").with_citations(Some(vec!["https://x".into()])),
            ],
        );
        let body = serde_json::to_value(ApiRequest::from_request(&request, true)).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "assistant", "content": "answer"}
                ],
                "stream": true,
                "temperature": 1.0
            })
        );
    }

    #[test]
    fn request_body_with_thinking_and_max_tokens() {
        let request = ChatRequest::new("bedrock/anthropic.claude-3-7-sonnet", vec![])
            .with_max_tokens(Some(5000))
            .with_thinking(Some(ThinkingConfig::enabled(1024)));
        let body = serde_json::to_value(ApiRequest::from_request(&request, false)).unwrap();

        assert_eq!(body["max_tokens"], 5000);
        assert_eq!(body["thinking"], json!({"type": "enabled", "budget_tokens": 1024}));
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn api_error_message_prefers_server_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            api_error_message(StatusCode::UNAUTHORIZED, body),
            "Incorrect API key provided"
        );
    }

    #[test]
    fn api_error_message_falls_back_to_body_or_status() {
        assert_eq!(
            api_error_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
        assert_eq!(
            api_error_message(StatusCode::BAD_GATEWAY, ""),
            "502 Bad Gateway"
        );
    }

    #[test]
    fn completion_text_extraction() {
        let response = json!({"choices": [{"message": {"role": "assistant", "content": "Title"}}]});
        assert_eq!(completion_text(&response), Some("Title"));
        assert_eq!(completion_text(&json!({})), None);
    }
}
