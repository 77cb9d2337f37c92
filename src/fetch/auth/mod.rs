//! Credential decorators for [`super::HttpClient`].

mod api_key;

pub use api_key::{ApiKey, InvalidApiKey};
