//! Error types for the SMTP client transport.

use std::io;

use thiserror::Error;

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// TLS negotiation or verification failed.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The proxy refused or garbled the CONNECT tunnel.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// The server rejected authentication.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = anyhow::Result<T, ClientError>;
