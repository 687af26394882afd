//! Stateless REST client for out-of-band API calls.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;

use crate::config::ApiConfig;
use crate::error::Result;

/// Authenticated REST client.
///
/// Every call is a single request: no retries, no timeout, no rate-limit
/// handling. Non-2xx responses are not errors; their body is returned like
/// any other.
#[derive(Clone)]
pub struct RestClient {
    http_client: Client,
    token: String,
    base_url: String,
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    /// The body was not valid JSON (including an empty body).
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Json(_) => None,
            ResponseBody::Text(text) => Some(text),
        }
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(token: impl Into<String>, api: &ApiConfig) -> Self {
        Self {
            http_client: Client::new(),
            token: token.into(),
            base_url: api.base_url(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` relative to the configured base path.
    pub async fn get(&self, path: &str) -> Result<ResponseBody> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?;

        Self::decode(response).await
    }

    /// POST `body` as JSON to `path` relative to the configured base path.
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ResponseBody>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        tracing::debug!("POST {}", url);

        let payload = serde_json::to_vec(body)?;
        let response = self
            .http_client
            .post(&url)
            .header(AUTHORIZATION, &self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode(response: Response) -> Result<ResponseBody> {
        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(status = %status.as_u16(), bytes = text.len(), "REST response");
        parse_body(text)
    }
}

/// JSON when the body parses, raw text on a syntax-level failure.
fn parse_body(text: String) -> Result<ResponseBody> {
    match serde_json::from_str(&text) {
        Ok(value) => Ok(ResponseBody::Json(value)),
        Err(e) if e.is_syntax() || e.is_eof() => Ok(ResponseBody::Text(text)),
        Err(e) => Err(e.into()),
    }
}
