use shared::error::ApiRejection;
use thiserror::Error;

use crate::view::ViewError;

/// Failures surfaced by the client. Transport, authentication, server
/// rejection and malformed-payload cases stay distinct so callers can pick
/// between retrying, re-authenticating and reporting.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A locally-required credential is missing; no network call was made.
    #[error("not signed in: {0}")]
    AuthRequired(&'static str),
    /// The server refused the stored token on an authenticated call.
    #[error("session rejected by server: {0}")]
    SessionExpired(ApiRejection),
    /// Validation/ownership rejection or any other non-auth error status.
    #[error("request rejected: {0}")]
    Rejected(ApiRejection),
    #[error("network failure: {0}")]
    Transport(reqwest::Error),
    #[error("malformed server response: {0}")]
    MalformedResponse(String),
    /// An action was submitted before `load_connections` populated the lists.
    #[error("connection lists are not loaded")]
    ListsNotLoaded,
    /// The action is not available on the targeted item right now.
    #[error("action unavailable: {0}")]
    ActionUnavailable(#[from] ViewError),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::MalformedResponse(err.to_string())
        } else {
            ClientError::Transport(err)
        }
    }
}
