//! [`ChatApi`] over HTTP with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use parley_proto::{Conversation, Member, Message, RoomId};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{api::ChatApi, config::DEFAULT_REQUEST_TIMEOUT, error::ApiError};

/// Default base URL of the chat HTTP API.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

#[derive(Serialize)]
struct NewMessage<'a> {
    conversation_id: RoomId,
    content: &'a str,
}

/// Bearer-authenticated client for the chat REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

fn request_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() { ApiError::Timeout } else { ApiError::Request(error.to_string()) }
}

impl HttpChatApi {
    /// Client for `base_url` authenticating with `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: token.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Give up on any request that takes longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        response.json().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, usize)],
    ) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .query(query)
            .send()
            .await
            .map_err(request_error)?;
        Self::read(response).await
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_messages(
        &self,
        room_id: RoomId,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        self.get(&format!("/messages/conversation/{room_id}"), &[("skip", skip), ("limit", limit)])
            .await
    }

    async fn send_message(&self, room_id: RoomId, content: String) -> Result<Message, ApiError> {
        debug!(room_id, "POST /messages");
        let response = self
            .client
            .post(self.url("/messages"))
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(&NewMessage { conversation_id: room_id, content: &content })
            .send()
            .await
            .map_err(request_error)?;
        Self::read(response).await
    }

    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.get("/conversations", &[]).await
    }

    async fn fetch_members(&self, room_id: RoomId) -> Result<Vec<Member>, ApiError> {
        self.get(&format!("/conversations/{room_id}/members"), &[]).await
    }
}
