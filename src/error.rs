use reqwest::StatusCode;

/// Failures a chat or status request can end in.
///
/// Every variant is recoverable: the UI renders it and returns to idle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// The request never produced an HTTP response.
    #[error("connection error: {0}")]
    Connection(String),
    /// 503, or a failure payload carrying `loading: true`.
    #[error("model is still loading: {0}")]
    ModelLoading(String),
    /// 408, or the client gave up waiting.
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    Generic(String),
}

impl ChatError {
    /// Text shown as the error entry in the transcript.
    pub fn display_message(&self) -> String {
        match self {
            ChatError::Connection(_) => "Connection error. Try again.".to_string(),
            ChatError::ModelLoading(_) => {
                "The model is still loading. This can take a few minutes on the first run."
                    .to_string()
            }
            ChatError::Timeout(_) => "Timeout - the model may be busy. Try again.".to_string(),
            ChatError::Generic(message) => message.clone(),
        }
    }

    pub fn is_recoverable_by_polling(&self) -> bool {
        matches!(self, ChatError::ModelLoading(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout(err.to_string())
        } else if err.is_decode() {
            ChatError::Generic(format!("Invalid response from server: {err}"))
        } else {
            ChatError::Connection(err.to_string())
        }
    }
}

/// Sort a `success: false` answer (or an unparseable one) into the taxonomy.
///
/// The loading flag wins over the status code, then 503, then 408.
pub fn classify_failure(status: StatusCode, loading: bool, error: Option<String>) -> ChatError {
    let detail = error.unwrap_or_else(|| match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    });

    if loading || status == StatusCode::SERVICE_UNAVAILABLE {
        ChatError::ModelLoading(detail)
    } else if status == StatusCode::REQUEST_TIMEOUT {
        ChatError::Timeout(detail)
    } else {
        ChatError::Generic(detail)
    }
}
