//! Server and proxy address parsing.
//!
//! Accepts the forms users actually type: a bare hostname, `host:port`,
//! or a URL-style `scheme://host:port`. The scheme is informational only
//! and is stripped before connecting.

use std::fmt::{self, Display};

use thiserror::Error;

/// Default port for SMTP submission (RFC 6409).
pub const SUBMISSION_PORT: u16 = 587;

/// Default port assumed for an HTTP proxy when none is given.
pub const PROXY_PORT: u16 = 8080;

/// Errors raised while parsing an address string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The address was empty after trimming.
    #[error("address is empty")]
    Empty,

    /// The part after the last colon is not a valid port number.
    #[error("invalid port in '{0}'")]
    InvalidPort(String),
}

/// A resolved `host:port` pair ready to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    /// Parses an address string, applying `default_port` when the input
    /// carries no explicit port.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or the port is malformed.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, AddressError> {
        let trimmed = input.trim();

        // Strip a scheme prefix such as smtp:// or http://
        let without_scheme = trimmed
            .split_once("://")
            .map_or(trimmed, |(_, rest)| rest);

        if without_scheme.is_empty() {
            return Err(AddressError::Empty);
        }

        match without_scheme.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(AddressError::Empty);
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AddressError::InvalidPort(trimmed.to_string()))?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Self {
                host: without_scheme.to_string(),
                port: default_port,
            }),
        }
    }

    /// The host component, without scheme or port.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port component.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
