//! The submission engine: one connection, one transaction, one
//! outcome.
//!
//! A submission either ends with the server accepting the complete
//! message or with an error telling the caller which phase gave up.
//! Nothing is retried and no partial success is reported; dropping the
//! connection on the error path is the only cleanup there is.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::address::{HostPort, PROXY_PORT, SUBMISSION_PORT};
use crate::client::{authenticate, Response, ServerExtensions, SmtpConnection};
use crate::config::Timeouts;
use crate::error::{SubmissionError, SubmitError, TransportError, ValidationError};
use crate::internal;
use crate::message::Message;

/// Options that shape a submission without being part of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Name presented in EHLO.
    pub helo_name: String,
    /// Per-phase deadlines.
    pub timeouts: Timeouts,
    /// Log the protocol exchange at info level.
    pub verbose: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            helo_name: "localhost".to_string(),
            timeouts: Timeouts::default(),
            verbose: false,
        }
    }
}

/// The server's acceptance of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Status code of the final response.
    pub code: u16,
    /// Message text of the final response.
    pub message: String,
}

/// Submits a message with default options.
///
/// # Errors
///
/// Returns a [`SubmitError`] if any phase of the submission fails.
pub async fn submit(message: Message) -> Result<Receipt, SubmitError> {
    Submission::new(message, &SubmitOptions::default())
        .submit()
        .await
}

/// A single submission attempt for one message.
///
/// Consumes the message: its content cursor only moves forward, so a
/// second attempt would need a freshly built message.
pub struct Submission<'a> {
    message: Message,
    options: &'a SubmitOptions,
}

impl<'a> Submission<'a> {
    #[must_use]
    pub const fn new(message: Message, options: &'a SubmitOptions) -> Self {
        Self { message, options }
    }

    /// Runs the complete transaction:
    ///
    /// 1. Connects to the server, through the proxy tunnel when the
    ///    message names one
    /// 2. Reads the greeting and sends EHLO
    /// 3. Upgrades to TLS via STARTTLS, with full verification
    /// 4. Sends EHLO again and authenticates
    /// 5. Sends MAIL FROM, then RCPT TO for every recipient in order
    /// 6. Streams the content after DATA and awaits acceptance
    /// 7. Sends QUIT, whose failure no longer changes the outcome
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] naming the phase that failed. Endpoint
    /// addresses that do not parse fail as validation errors before
    /// any connection is made.
    pub async fn submit(mut self) -> Result<Receipt, SubmitError> {
        let server = HostPort::parse(self.message.server_address(), SUBMISSION_PORT)
            .map_err(|err| ValidationError::InvalidServer(err.to_string()))?;

        let proxy = self
            .message
            .proxy_address()
            .map(|proxy| HostPort::parse(proxy, PROXY_PORT))
            .transpose()
            .map_err(|err| ValidationError::InvalidProxy(err.to_string()))?;

        let (connector, server_name) = build_tls(server.host())?;

        let mut connection = self.connect_and_greet(&server, proxy.as_ref()).await?;

        let extensions = self
            .establish_tls(&mut connection, &connector, server_name)
            .await?;

        let command_timeout = self.options.timeouts.command_timeout();
        timeout(
            command_timeout,
            authenticate(&mut connection, self.message.credentials(), &extensions),
        )
        .await
        .map_err(|_| SubmissionError::Timeout("AUTH".to_string()))??;

        // With SIZE advertised, an oversized message can be refused
        // before a single content byte is sent.
        let size = self.message.raw().len();
        check_message_size(size, extensions.max_message_size())?;

        let declared_size = extensions.advertises_size().then_some(size);
        let response = timeout(
            command_timeout,
            connection.mail_from(self.message.sender(), declared_size),
        )
        .await
        .map_err(|_| SubmissionError::Timeout("MAIL FROM".to_string()))??;

        if !response.is_success() {
            return Err(SubmissionError::SenderRejected(format!(
                "{} {}",
                response.code,
                response.message()
            ))
            .into());
        }

        send_recipients(&mut connection, self.message.recipients(), command_timeout).await?;

        let response = timeout(command_timeout, connection.data())
            .await
            .map_err(|_| SubmissionError::Timeout("DATA".to_string()))??;

        if !response.is_intermediate() {
            return Err(SubmissionError::MessageRejected(format!(
                "DATA refused: {} {}",
                response.code,
                response.message()
            ))
            .into());
        }

        let response = timeout(
            self.options.timeouts.data_timeout(),
            connection.stream_data(self.message.raw_mut()),
        )
        .await
        .map_err(|_| SubmissionError::Timeout("content transfer".to_string()))??;

        if !response.is_success() {
            return Err(SubmissionError::MessageRejected(format!(
                "{} {}",
                response.code,
                response.message()
            ))
            .into());
        }

        let receipt = Receipt {
            code: response.code,
            message: response.message(),
        };

        // The message is accepted; QUIT failing changes nothing.
        match timeout(self.options.timeouts.quit_timeout(), connection.quit()).await {
            Err(_) => internal!(level = WARN, "QUIT timed out after acceptance"),
            Ok(Err(err)) => internal!(level = WARN, "QUIT failed after acceptance: {err}"),
            Ok(Ok(_)) => {}
        }

        Ok(receipt)
    }

    /// Opens the connection, directly or through the proxy, and checks
    /// the greeting.
    async fn connect_and_greet(
        &self,
        server: &HostPort,
        proxy: Option<&HostPort>,
    ) -> Result<SmtpConnection, SubmitError> {
        let connecting = async {
            match proxy {
                Some(proxy) => {
                    internal!(level = DEBUG, "Tunneling to {server} through {proxy}");
                    SmtpConnection::connect_via_proxy(
                        &proxy.to_string(),
                        server.host(),
                        server.port(),
                    )
                    .await
                }
                None => SmtpConnection::connect(&server.to_string()).await,
            }
        };

        let connection = timeout(self.options.timeouts.connect_timeout(), connecting)
            .await
            .map_err(|_| SubmissionError::Timeout(format!("connect to {server}")))?
            .map_err(|err| match err {
                crate::client::ClientError::Io(source) => {
                    SubmissionError::ConnectionFailed(format!("{server}: {source}"))
                }
                other => SubmissionError::from(other),
            })?;

        let mut connection = connection.verbose(self.options.verbose);

        let greeting = timeout(
            self.options.timeouts.command_timeout(),
            connection.read_greeting(),
        )
        .await
        .map_err(|_| SubmissionError::Timeout("greeting".to_string()))??;

        if !greeting.is_success() {
            return Err(SubmissionError::Rejected(format!(
                "{} {}",
                greeting.code,
                greeting.message()
            ))
            .into());
        }

        Ok(connection)
    }

    /// Greets the server and upgrades the session to verified TLS.
    ///
    /// The server must advertise STARTTLS and accept it; there is no
    /// plaintext fallback. Returns the capabilities advertised inside
    /// the protected session.
    async fn establish_tls(
        &self,
        connection: &mut SmtpConnection,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<ServerExtensions, SubmitError> {
        let command_timeout = self.options.timeouts.command_timeout();

        let ehlo = timeout(command_timeout, connection.ehlo(&self.options.helo_name))
            .await
            .map_err(|_| SubmissionError::Timeout("EHLO".to_string()))??;

        if !ehlo.is_success() {
            return Err(SubmissionError::Rejected(format!(
                "EHLO refused: {} {}",
                ehlo.code,
                ehlo.message()
            ))
            .into());
        }

        let extensions = ServerExtensions::from_response(&ehlo);
        if !extensions.starttls() {
            return Err(
                SubmissionError::Tls("Server does not offer STARTTLS".to_string()).into(),
            );
        }

        let response = timeout(
            command_timeout,
            connection.starttls(connector, server_name),
        )
        .await
        .map_err(|_| SubmissionError::Timeout("STARTTLS".to_string()))??;

        if !response.is_success() {
            return Err(SubmissionError::Tls(format!(
                "STARTTLS refused: {} {}",
                response.code,
                response.message()
            ))
            .into());
        }

        // Capabilities can differ inside the protected session.
        let ehlo = timeout(command_timeout, connection.ehlo(&self.options.helo_name))
            .await
            .map_err(|_| SubmissionError::Timeout("EHLO".to_string()))??;

        if !ehlo.is_success() {
            return Err(SubmissionError::Rejected(format!(
                "EHLO refused after STARTTLS: {} {}",
                ehlo.code,
                ehlo.message()
            ))
            .into());
        }

        Ok(ServerExtensions::from_response(&ehlo))
    }
}

/// Anything that can declare a recipient and report the verdict.
trait RecipientSink {
    async fn declare(&mut self, recipient: &str) -> crate::client::Result<Response>;
}

impl RecipientSink for SmtpConnection {
    async fn declare(&mut self, recipient: &str) -> crate::client::Result<Response> {
        self.rcpt_to(recipient).await
    }
}

/// Sends RCPT TO for every recipient in list order.
///
/// A rejected recipient does not stop the remaining commands; it is
/// logged and remembered. Only when no recipient at all is accepted
/// does the transaction fail, surfacing the first rejection. A
/// transport failure or timeout aborts the remainder immediately.
async fn send_recipients<S: RecipientSink>(
    sink: &mut S,
    recipients: &[String],
    command_timeout: Duration,
) -> Result<(), SubmitError> {
    let mut accepted = 0usize;
    let mut first_rejection = None;

    for recipient in recipients {
        let response = timeout(command_timeout, sink.declare(recipient))
            .await
            .map_err(|_| SubmissionError::Timeout(format!("RCPT TO {recipient}")))??;

        if response.is_success() {
            accepted += 1;
            continue;
        }

        let kind = if response.is_permanent_error() {
            "permanently"
        } else {
            "temporarily"
        };
        internal!(
            level = WARN,
            "Recipient {recipient} {kind} rejected: {} {}",
            response.code,
            response.message()
        );

        if first_rejection.is_none() {
            first_rejection = Some(SubmissionError::RecipientRejected(format!(
                "{recipient}: {} {}",
                response.code,
                response.message()
            )));
        }
    }

    if accepted == 0 {
        let rejection = first_rejection.unwrap_or_else(|| {
            SubmissionError::RecipientRejected("No recipient was accepted".to_string())
        });
        return Err(rejection.into());
    }

    Ok(())
}

/// Refuses a message larger than the server's advertised limit.
///
/// Runs before MAIL FROM so an oversized message never starts a
/// transaction. A server that advertises no limit leaves the size
/// unchecked.
fn check_message_size(size: usize, limit: Option<usize>) -> Result<(), SubmissionError> {
    match limit {
        Some(max) if size > max => Err(SubmissionError::MessageTooLarge(format!(
            "{size} bytes exceeds the server limit of {max}"
        ))),
        _ => Ok(()),
    }
}

/// Builds the TLS connector against the system trust store.
///
/// Verification is always full. No configuration reaches this point
/// that could relax it.
fn build_tls(host: &str) -> Result<(TlsConnector, ServerName<'static>), SubmitError> {
    let mut root_store = RootCertStore::empty();

    // Add system certificates
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store
            .add(cert)
            .map_err(|err| TransportError::RootStore(format!("Failed to add certificate: {err}")))?;
    }
    // Log errors but don't fail if some certs couldn't be loaded
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "Some certificates could not be loaded");
    }

    if root_store.is_empty() {
        return Err(TransportError::RootStore(
            "No trusted root certificates available".to_string(),
        )
        .into());
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|err| TransportError::InvalidServerName(format!("{host}: {err}")))?;

    Ok((TlsConnector::from(Arc::new(config)), server_name))
}
