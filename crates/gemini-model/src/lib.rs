//! A model provider for Google's Generative Language (Gemini) API.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::sync::Arc;

use little_chat_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use mime::Mime;
use reqwest::{Client, StatusCode, header};

pub use config::{GeminiConfig, GeminiConfigBuilder};
use io::{Chunks, Sse};
use response::GeminiResponse;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Error type for [`GeminiProvider`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never got an answer.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with an error status.
    #[error("{status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The answer is not a `streamGenerateContent` event stream.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The prompt or the reply was blocked by a safety filter.
    #[error("{0}")]
    Blocked(String),
}

impl ModelProviderError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Status {
                status: StatusCode::TOO_MANY_REQUESTS,
                ..
            } => ErrorKind::RateLimitExceeded,
            Self::Malformed(_) => ErrorKind::MalformedResponse,
            Self::Blocked(_) => ErrorKind::Moderated,
            Self::Transport(_) | Self::Status { .. } => ErrorKind::Other,
        }
    }
}

/// Gemini model provider.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for GeminiProvider {
    type Error = Error;
    type Response = GeminiResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let gemini_req = proto::create_request(req);
        let resp_fut = self
            .client
            .post(self.config.stream_url())
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(&gemini_req)
            .send();

        async move {
            let resp = resp_fut.await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Status { status, body });
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::Malformed(format!(
                    "unexpected content type: {content_type:?}"
                )));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(GeminiResponse::from_sse(sse))
        }
    }
}
