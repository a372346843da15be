//! Error taxonomy for requests and push payloads

use thiserror::Error;

/// Failures of a request/response cycle against the backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network-level failure (request never completed)
    #[error("request failed: {0}")]
    Transport(String),
    /// Server answered with a non-success status
    #[error("HTTP error! status: {0}")]
    Status(u16),
    /// Server answered successfully but reported a domain error
    #[error("{0}")]
    Domain(String),
    /// Response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

/// Reasons a push-channel message is dropped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    #[error("malformed push payload: {0}")]
    Malformed(String),
    #[error("unknown push event: {0}")]
    UnknownEvent(String),
    #[error("empty field in push payload: {0}")]
    EmptyField(&'static str),
}
