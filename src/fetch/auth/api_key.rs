use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;

/// Header the agency's feed endpoint reads the key from.
pub const API_KEY_HEADER: &str = "apiKey";

#[derive(Debug, Error)]
pub enum InvalidApiKey {
    #[error("invalid header name {0:?}")]
    HeaderName(String),
    #[error("API key contains characters not allowed in a header value")]
    HeaderValue,
}

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// The header name and value are validated once at construction, so every
/// request carries them without a fallible conversion on the hot path.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self, InvalidApiKey> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|_| InvalidApiKey::HeaderName(header_name.to_string()))?;
        let mut value = HeaderValue::from_str(key).map_err(|_| InvalidApiKey::HeaderValue)?;
        value.set_sensitive(true);

        Ok(Self {
            inner,
            header_name,
            value,
        })
    }

    /// Uses the `apiKey: <key>` header expected by the upstream feed.
    pub fn header(inner: C, key: &str) -> Result<Self, InvalidApiKey> {
        Self::new(inner, API_KEY_HEADER, key)
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}
