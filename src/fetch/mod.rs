//! HTTP retrieval of the upstream GTFS-RT feeds.
//!
//! [`HttpClient`] is the transport seam; [`BasicClient`] is the reqwest-backed
//! implementation and [`auth::ApiKey`] decorates any client with the agency's
//! API-key header. [`RealtimeFeedClient`] ties a client to one feed endpoint.

pub mod auth;
mod basic;
mod client;
mod error;
mod feed;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use error::FetchError;
pub use feed::{FeedKind, RealtimeFeedClient};

use bytes::Bytes;
use reqwest::Url;
use tracing::debug;

/// Longest slice of an error body kept in [`FetchError::UpstreamError`].
const MAX_ERROR_BODY: usize = 256;

/// Issues a single GET and returns the body of a 2xx response.
///
/// Transport failures (including the client's timeout) become
/// [`FetchError::NetworkFailure`]; any other status becomes
/// [`FetchError::UpstreamError`]. Nothing is retried here.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &Url) -> Result<Bytes, FetchError> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.clone());

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::UpstreamError {
            status: status.as_u16(),
            detail: truncate(body, MAX_ERROR_BODY),
        });
    }

    let bytes = resp.bytes().await?;
    debug!(bytes = bytes.len(), "Feed bytes received");
    Ok(bytes)
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
pub(crate) mod testing {
    use super::HttpClient;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::Mutex;

    /// Answers every request with a fixed status and body, recording the
    /// request headers it saw.
    pub struct CannedClient {
        status: u16,
        body: Vec<u8>,
        pub seen_headers: Mutex<Vec<HeaderMap>>,
    }

    impl CannedClient {
        pub fn new(status: u16, body: Vec<u8>) -> Self {
            Self {
                status,
                body,
                seen_headers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CannedClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.seen_headers.lock().unwrap().push(req.headers().clone());
            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body.clone())
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }
}
