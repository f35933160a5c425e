//! Error taxonomy for the submission pipeline.
//!
//! Failures are split by phase: [`ValidationError`] before any network
//! activity, [`TransportError`] when the TLS machinery cannot be set
//! up, and [`SubmissionError`] for everything that goes wrong while
//! talking to the server. [`SubmitError`] is the umbrella the public
//! API returns.

use crate::client::ClientError;

/// Input was malformed or incomplete, detected before any connection
/// attempt.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Server address must not be empty")]
    EmptyServer,

    #[error("Sender address must not be empty")]
    EmptySender,

    #[error("At least one recipient is required")]
    NoRecipients,

    #[error("Invalid server address: {0}")]
    InvalidServer(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxy(String),
}

/// The secure transport machinery could not be initialized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unable to load trusted root certificates: {0}")]
    RootStore(String),

    #[error("Invalid server name for TLS verification: {0}")]
    InvalidServerName(String),
}

/// The submission failed while connecting to or conversing with the
/// server.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Proxy tunnel failed: {0}")]
    Proxy(String),

    #[error("Server rejected the session: {0}")]
    Rejected(String),

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Sender rejected: {0}")]
    SenderRejected(String),

    #[error("Recipient rejected: {0}")]
    RecipientRejected(String),

    #[error("Message rejected: {0}")]
    MessageRejected(String),

    #[error("Message too large: {0}")]
    MessageTooLarge(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed unexpectedly")]
    ConnectionLost,
}

/// Any failure a submission can surface, tagged by phase.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),
}

impl SubmitError {
    /// Whether the failure happened before any network activity.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the transport machinery could not be set up.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the failure happened during the SMTP conversation.
    #[must_use]
    pub const fn is_submission(&self) -> bool {
        matches!(self, Self::Submission(_))
    }
}

impl From<ClientError> for SubmissionError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Io(source) => Self::ConnectionFailed(source.to_string()),
            ClientError::ConnectionClosed => Self::ConnectionLost,
            ClientError::TlsError(reason) => Self::Tls(reason),
            ClientError::Proxy(reason) => Self::Proxy(reason),
            ClientError::Authentication(reason) => Self::Authentication(reason),
            ClientError::ParseError(reason) => Self::Protocol(reason),
            ClientError::Utf8Error(source) => Self::Protocol(source.to_string()),
        }
    }
}

impl From<ClientError> for SubmitError {
    fn from(err: ClientError) -> Self {
        Self::Submission(SubmissionError::from(err))
    }
}
