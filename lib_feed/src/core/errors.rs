//! # Feed Errors
//!
//! Every failure the client can observe is folded into [`FeedError`] and
//! recorded on the façade's `last_error` slot. None of them are fatal: the
//! worker keeps retrying for as long as auto-reconnect is enabled.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("connection attempt timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed abnormally ({code}): {reason}")]
    AbnormalClosure { code: u16, reason: String },

    #[error("connection closed by server ({code}): {reason}")]
    RemoteClosure { code: u16, reason: String },

    #[error("connection closed by client")]
    CleanClosure,

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("failed to encode frame: {0}")]
    Encode(String),

    #[error("server reported an error: {0}")]
    Server(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FeedError {
    /// True for the errors that end a connection and lead to a scheduled retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::ConnectTimeout(_)
                | FeedError::AbnormalClosure { .. }
                | FeedError::RemoteClosure { .. }
        )
    }
}

/// Human-readable text for a WebSocket close code.
pub fn describe_close_code(code: u16) -> &'static str {
    match code {
        1000 => "normal closure",
        1001 => "going away",
        1002 => "protocol error",
        1003 => "unsupported data",
        1005 => "no status received",
        1006 => "abnormal closure",
        1011 => "server error",
        _ => "unknown close code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_have_readable_text() {
        assert_eq!(describe_close_code(1000), "normal closure");
        assert_eq!(describe_close_code(1006), "abnormal closure");
        assert_eq!(describe_close_code(1011), "server error");
        assert_eq!(describe_close_code(4999), "unknown close code");
    }

    #[test]
    fn only_connection_ending_errors_are_retryable() {
        assert!(FeedError::ConnectTimeout(Duration::from_secs(10)).is_retryable());
        assert!(FeedError::AbnormalClosure { code: 1006, reason: "abnormal closure".into() }.is_retryable());
        assert!(!FeedError::CleanClosure.is_retryable());
        assert!(!FeedError::Server("bad code".into()).is_retryable());
        assert!(!FeedError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn timeout_message_is_in_millis() {
        let err = FeedError::ConnectTimeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "connection attempt timed out after 10000ms");
    }
}
