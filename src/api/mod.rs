//! HTTP client for the persona backend.
//!
//! [`ChatApi`] is the seam the session controller talks through;
//! [`HttpChatApi`] is the production implementation over `reqwest`. Tests
//! substitute scripted implementations.

pub mod types;

use crate::config::ApiConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub use types::{
    Admission, ChatReply, ChatRequest, GenerationStatus, HeartbeatStatus, HistoryTurn,
    PaymentRequest,
};

/// Header carrying the durable session identifier.
pub const SESSION_HEADER: &str = "X-Session-Id";

/// Backend operations used by the session controller.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST chat`.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// `GET generation-status/{request_id}`.
    async fn generation_status(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> Result<GenerationStatus>;

    /// `GET initial-connection/{session_id}`.
    async fn initial_connection(&self, session_id: &str) -> Result<Admission>;

    /// `GET heartbeat`.
    async fn heartbeat(&self, session_id: &str) -> Result<HeartbeatStatus>;
}

/// [`ChatApi`] over HTTP(S) JSON.
pub struct HttpChatApi {
    config: ApiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpChatApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatApi")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl HttpChatApi {
    /// Build a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn url_with_segment(&self, path: &str, segment: &str) -> String {
        let prefix = self.url(path);
        let prefix = prefix.trim_end_matches('/');
        format!("{prefix}/{}", urlencoding::encode(segment))
    }

    fn with_bearer(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.bearer_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.bearer_token)
        }
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        session_id: &str,
    ) -> reqwest::RequestBuilder {
        self.with_bearer(request.header(SESSION_HEADER, session_id))
    }

    /// Send the request and decode the JSON body.
    ///
    /// A non-success status still yields the body when it carries an `error`
    /// payload, so business errors reach the caller as data.
    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            return match body {
                Some(v) if !v["error"].is_null() => Ok(v),
                _ => Err(ClientError::Http(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    truncate(&text, 200)
                ))),
            };
        }
        body.ok_or_else(|| {
            ClientError::Parse(format!("invalid JSON body: {}", truncate(&text, 200)))
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let url = self.url(&self.config.chat_path);
        debug!(%url, history = request.conversation_history.len(), "POST chat");
        let builder = self
            .authorize(self.client.post(&url), &request.session_id)
            .json(request);
        let body = self.send_json(builder).await?;
        types::parse_chat_reply(&body)
    }

    async fn generation_status(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> Result<GenerationStatus> {
        let url = self.url_with_segment(&self.config.generation_status_path, request_id);
        debug!(%url, "GET generation status");
        let body = self
            .send_json(self.authorize(self.client.get(&url), session_id))
            .await?;
        types::parse_generation_status(&body)
    }

    async fn initial_connection(&self, session_id: &str) -> Result<Admission> {
        let url = self.url_with_segment(&self.config.initial_connection_path, session_id);
        debug!(%url, "GET initial connection");
        let builder = self.authorize(self.client.get(&url), session_id);
        let body = self.send_json(builder).await?;
        types::parse_admission(&body)
    }

    async fn heartbeat(&self, session_id: &str) -> Result<HeartbeatStatus> {
        let url = self.url(&self.config.heartbeat_path);
        debug!(%url, "GET heartbeat");
        let builder = self.authorize(self.client.get(&url), session_id);
        let body = self.send_json(builder).await?;
        types::parse_heartbeat(&body)
    }
}
