use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{classify_failure, ChatError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub cuda_available: bool,
    #[serde(default)]
    pub gpu_name: Option<String>,
}

impl DeviceInfo {
    /// Short label for the header, e.g. `GPU (RTX 3060)` or `CPU`.
    pub fn label(&self) -> String {
        if self.cuda_available {
            format!("GPU ({})", self.gpu_name.as_deref().unwrap_or("CUDA"))
        } else {
            "CPU".to_string()
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BackendStatus {
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub loading_status: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    loading: Option<bool>,
}

/// A successful `/chat` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub device: Option<String>,
    pub model: Option<String>,
}

/// The two calls the controller makes against the model server.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn status(&self) -> Result<BackendStatus, ChatError>;

    async fn chat(&self, message: &str) -> Result<ChatReply, ChatError>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn status(&self) -> Result<BackendStatus, ChatError> {
        let url = format!("{}/status", self.base_url);
        tracing::debug!(%url, "checking backend status");

        let response = self.client.get(&url).send().await?;
        let status: BackendStatus = response.json().await?;
        Ok(status)
    }

    async fn chat(&self, message: &str) -> Result<ChatReply, ChatError> {
        let url = format!("{}/chat", self.base_url);
        tracing::debug!(%url, chars = message.chars().count(), "sending chat message");

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { message })
            .send()
            .await?;

        let status = response.status();
        let body: ChatResponse = match response.json().await {
            Ok(body) => body,
            Err(err) if status.is_success() => return Err(err.into()),
            Err(_) => return Err(classify_failure(status, false, None)),
        };

        if body.success {
            match body.response {
                Some(response) => Ok(ChatReply {
                    response,
                    device: body.device,
                    model: body.model,
                }),
                None => Err(ChatError::Generic(
                    "Server reported success without a response".to_string(),
                )),
            }
        } else {
            tracing::warn!(status = status.as_u16(), error = ?body.error, "chat request failed");
            Err(classify_failure(
                status,
                body.loading.unwrap_or(false),
                body.error,
            ))
        }
    }
}
