use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletionChunk, ChatCompletionParams};

/// Default endpoint for OpenAI-compatible chat completions.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A lazy, single-consumption stream of chat completion chunks.
///
/// Dropping the stream releases the underlying connection; no further chunks
/// are produced after that point.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Anything that can open a streaming chat completion.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streaming chat completion for the given parameters.
    async fn stream(&self, params: ChatCompletionParams) -> Result<ChunkStream>;
}

/// Client for an OpenAI-compatible chat completion API.
#[derive(Debug, Clone)]
pub struct ChatClient {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
}

impl ChatClient {
    /// Create a new client against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// Only the connect phase is bounded by `connect_timeout`; an open stream
    /// may run for as long as the server keeps it alive.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::authentication("API key must not be empty"));
        }
        HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            Error::authentication("API key contains characters not allowed in a header")
        })?;

        let mut base_url = Url::parse(base_url.unwrap_or(DEFAULT_API_URL))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
        })
    }

    /// The resolved chat completions endpoint.
    pub fn endpoint(&self) -> Result<Url> {
        Ok(self.base_url.join("chat/completions")?)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());
        let error_message = detail
            .and_then(|e| e.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            429 => Error::rate_limit(error_message, retry_after),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for ChatClient {
    async fn stream(&self, mut params: ChatCompletionParams) -> Result<ChunkStream> {
        params.stream = true;
        let url = self.endpoint()?;
        tracing::debug!(
            model = %params.model,
            messages = params.messages.len(),
            "opening chat completion stream"
        );
        CLIENT_REQUESTS.click();
        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(&params)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::warn!(error = %err, "chat completion request rejected");
            return Err(err);
        }

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}
