use thiserror::Error;

/// Why a feed fetch produced no records.
///
/// Callers can tell "could not reach the server" ([`FetchError::NetworkFailure`])
/// apart from "the server answered with an error" ([`FetchError::UpstreamError`])
/// and "the server answered with garbage" ([`FetchError::DecodeFailure`]).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream unreachable: {detail}")]
    NetworkFailure { detail: String },

    #[error("upstream returned HTTP {status}: {detail}")]
    UpstreamError { status: u16, detail: String },

    #[error("malformed feed payload: {0}")]
    DecodeFailure(#[from] prost::DecodeError),
}

impl FetchError {
    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NetworkFailure { .. } => "network_failure",
            FetchError::UpstreamError { .. } => "upstream_error",
            FetchError::DecodeFailure(_) => "decode_failure",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // Status errors never reach here: fetch_bytes inspects the status itself.
        FetchError::NetworkFailure {
            detail: e.to_string(),
        }
    }
}
