//! SMTP authentication.
//!
//! Supports PLAIN and LOGIN, picked from what the server advertised.
//! Credential material is never written to the logs; the redacted
//! command path records a placeholder instead.

use std::fmt::{self, Display};

use base64::Engine;

use crate::internal;
use crate::message::Credentials;

use super::connection::SmtpConnection;
use super::error::{ClientError, Result};
use super::extensions::ServerExtensions;
use super::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mechanism {
    Plain,
    Login,
}

impl Display for Mechanism {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => fmt.write_str("PLAIN"),
            Self::Login => fmt.write_str("LOGIN"),
        }
    }
}

/// Authenticates the session with the mechanism negotiated from the
/// server's EHLO advertisement. PLAIN is preferred, LOGIN is the
/// fallback.
///
/// # Errors
///
/// Returns `ClientError::Authentication` if the server advertised no
/// usable mechanism or rejected the credentials, and any transport
/// error encountered along the way.
pub async fn authenticate(
    connection: &mut SmtpConnection,
    credentials: &Credentials,
    extensions: &ServerExtensions,
) -> Result<()> {
    let mechanism = select_mechanism(extensions)?;
    internal!(level = DEBUG, "Authenticating with {mechanism}");

    match mechanism {
        Mechanism::Plain => auth_plain(connection, credentials).await,
        Mechanism::Login => auth_login(connection, credentials).await,
    }
}

fn select_mechanism(extensions: &ServerExtensions) -> Result<Mechanism> {
    if extensions.supports_auth("PLAIN") {
        Ok(Mechanism::Plain)
    } else if extensions.supports_auth("LOGIN") {
        Ok(Mechanism::Login)
    } else if extensions.auth_mechanisms().is_empty() {
        Err(ClientError::Authentication(
            "Server advertised no authentication mechanism".to_string(),
        ))
    } else {
        Err(ClientError::Authentication(format!(
            "No supported mechanism among: {}",
            extensions.auth_mechanisms().join(", ")
        )))
    }
}

/// AUTH PLAIN: sends `\0username\0password` base64-encoded in one
/// shot.
async fn auth_plain(connection: &mut SmtpConnection, credentials: &Credentials) -> Result<()> {
    let encoded = plain_payload(credentials);
    let response = connection
        .command_redacted(&format!("AUTH PLAIN {encoded}"), "AUTH PLAIN ********")
        .await?;

    if response.is_success() {
        Ok(())
    } else {
        Err(rejection("AUTH PLAIN", &response))
    }
}

/// AUTH LOGIN: challenge-response with base64 username then password.
async fn auth_login(connection: &mut SmtpConnection, credentials: &Credentials) -> Result<()> {
    let response = connection.command("AUTH LOGIN").await?;
    if !response.is_intermediate() {
        return Err(rejection("AUTH LOGIN", &response));
    }

    // Server sends 334 VXNlcm5hbWU6 (base64 "Username:")
    let username = base64::engine::general_purpose::STANDARD.encode(credentials.username());
    let response = connection.command_redacted(&username, "********").await?;
    if !response.is_intermediate() {
        return Err(rejection("AUTH LOGIN username", &response));
    }

    // Server sends 334 UGFzc3dvcmQ6 (base64 "Password:")
    let password = base64::engine::general_purpose::STANDARD.encode(credentials.password());
    let response = connection.command_redacted(&password, "********").await?;

    if response.is_success() {
        Ok(())
    } else {
        Err(rejection("AUTH LOGIN password", &response))
    }
}

fn plain_payload(credentials: &Credentials) -> String {
    let payload = format!("\0{}\0{}", credentials.username(), credentials.password());
    base64::engine::general_purpose::STANDARD.encode(payload.as_bytes())
}

fn rejection(step: &str, response: &Response) -> ClientError {
    ClientError::Authentication(format!(
        "{step} rejected: {} {}",
        response.code,
        response.message()
    ))
}
