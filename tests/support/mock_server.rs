//! Mock SMTP server for exercising the submission client
//!
//! A configurable plaintext SMTP endpoint that:
//! - Answers each command with a scripted response
//! - Records every command it receives, for order and wire-format
//!   assertions
//! - Captures DATA content byte-for-byte as transferred, so transfer
//!   encoding can be checked on the wire
//! - Injects failures (delays, dropped connections, hangs)
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_greeting(220, "Test server ready")
//!     .with_rcpt_to_response(550, "User unknown")
//!     .build()
//!     .await?;
//!
//! // Connect to server.addr() and drive a session
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

#![allow(dead_code)] // Test utility module, not every test uses every knob

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO command with the client name
    Ehlo(String),
    /// MAIL command with its full argument, e.g. `FROM:<a@b> SIZE=42`
    MailFrom(String),
    /// RCPT command with its full argument, e.g. `TO:<a@b>`
    RcptTo(String),
    /// DATA command
    Data,
    /// Content transferred after DATA, as received on the wire
    MessageContent(Vec<u8>),
    /// AUTH command with its argument, e.g. `PLAIN dGVzdA==` or `LOGIN`
    Auth(String),
    /// A line sent in reply to an AUTH challenge
    AuthData(String),
    /// STARTTLS command
    StartTls,
    /// QUIT command
    Quit,
    /// Unknown/other command
    Other(String),
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// SMTP status code (e.g., 250, 550)
    pub code: u16,
    /// Response message
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

/// Multi-line EHLO response, one line per capability
#[derive(Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let cap_count = self.capabilities.len();

        for (i, cap) in self.capabilities.iter().enumerate() {
            if i < cap_count - 1 {
                let _ = write!(&mut response, "{}-{}\r\n", self.code, cap);
            } else {
                let _ = write!(&mut response, "{} {}\r\n", self.code, cap);
            }
        }

        response.into_bytes()
    }
}

/// Mock SMTP server configuration
#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_response: EhloResponse,
    mail_from_response: SmtpResponse,
    /// Consumed one per RCPT TO; the last entry repeats.
    rcpt_to_responses: Vec<SmtpResponse>,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    /// Consumed one per AUTH step; the last entry repeats. A 334
    /// response makes the server treat the next line as challenge
    /// data rather than a command.
    auth_responses: Vec<SmtpResponse>,
    quit_response: SmtpResponse,
    starttls_response: Option<SmtpResponse>,

    // Failure injection
    connection_delay: Option<Duration>,
    response_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
    timeout_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_response: EhloResponse {
                code: 250,
                capabilities: vec![
                    "mock.local".to_string(),
                    "SIZE 10240".to_string(),
                    "AUTH PLAIN LOGIN".to_string(),
                ],
            },
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_responses: vec![SmtpResponse::new(250, "OK")],
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            auth_responses: vec![SmtpResponse::new(235, "Authentication succeeded")],
            quit_response: SmtpResponse::new(221, "Bye"),
            starttls_response: None,
            connection_delay: None,
            response_delay: None,
            drop_after_commands: None,
            timeout_on_command: None,
        }
    }
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    command_count: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    /// Create a new builder for configuring the mock server
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    /// Get the address the server is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get all commands received by the server
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Get the content of the first transferred message, as received
    pub async fn message_content(&self) -> Option<Vec<u8>> {
        self.commands_received
            .read()
            .await
            .iter()
            .find_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
    }

    /// Get the number of commands received
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.command_count.load(Ordering::Relaxed)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn rcpt_response(config: &MockServerConfig, index: usize) -> SmtpResponse {
        config
            .rcpt_to_responses
            .get(index)
            .or_else(|| config.rcpt_to_responses.last())
            .cloned()
            .unwrap_or_else(|| SmtpResponse::new(250, "OK"))
    }

    fn auth_response(config: &MockServerConfig, index: usize) -> SmtpResponse {
        config
            .auth_responses
            .get(index)
            .or_else(|| config.auth_responses.last())
            .cloned()
            .unwrap_or_else(|| SmtpResponse::new(235, "Authentication succeeded"))
    }

    /// Handle a single client connection
    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
        command_count: Arc<AtomicUsize>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // Apply connection delay if configured
        if let Some(delay) = config.connection_delay {
            tokio::time::sleep(delay).await;
        }

        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut local_command_count = 0;
        let mut rcpt_index = 0;
        let mut auth_index = 0;
        let mut auth_pending = false;

        // Send greeting
        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();

            // Check if we should drop the connection
            if let Some(drop_after) = config.drop_after_commands {
                if local_command_count >= drop_after {
                    // Silently close connection
                    return Ok(());
                }
            }

            // Check if we should hang on this command
            if let Some(timeout_on) = config.timeout_on_command {
                if local_command_count == timeout_on {
                    // Sleep indefinitely to simulate an unresponsive server
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    return Ok(());
                }
            }

            // Read command with timeout (10 seconds)
            let read_result = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;

            if read_result.is_err() {
                // Timeout reading command
                return Ok(());
            }

            let bytes_read = read_result??;
            if bytes_read == 0 {
                // Connection closed
                return Ok(());
            }

            local_command_count += 1;
            command_count.fetch_add(1, Ordering::Relaxed);

            let cmd_line = line.trim();

            // Inside an AUTH challenge the next line is data, not a command
            if auth_pending {
                commands
                    .write()
                    .await
                    .push(SmtpCommand::AuthData(cmd_line.to_string()));

                let resp = Self::auth_response(&config, auth_index);
                auth_index += 1;
                auth_pending = resp.code == 334;

                if let Some(delay) = config.response_delay {
                    tokio::time::sleep(delay).await;
                }
                writer.write_all(&resp.to_bytes()).await?;
                writer.flush().await?;
                continue;
            }

            // Parse command
            let parts: Vec<&str> = cmd_line.splitn(2, ' ').collect();
            let command = parts[0].to_uppercase();

            let (response, smtp_cmd) = match command.as_str() {
                "EHLO" => {
                    let hostname = parts.get(1).unwrap_or(&"").to_string();
                    (config.ehlo_response.to_bytes(), SmtpCommand::Ehlo(hostname))
                }
                "MAIL" => {
                    let from = parts.get(1).unwrap_or(&"").to_string();
                    (
                        config.mail_from_response.to_bytes(),
                        SmtpCommand::MailFrom(from),
                    )
                }
                "RCPT" => {
                    let to = parts.get(1).unwrap_or(&"").to_string();
                    let resp = Self::rcpt_response(&config, rcpt_index);
                    rcpt_index += 1;
                    (resp.to_bytes(), SmtpCommand::RcptTo(to))
                }
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "AUTH" => {
                    let args = parts.get(1).unwrap_or(&"").to_string();
                    let resp = Self::auth_response(&config, auth_index);
                    auth_index += 1;
                    auth_pending = resp.code == 334;
                    (resp.to_bytes(), SmtpCommand::Auth(args))
                }
                "QUIT" => {
                    let resp = config.quit_response.to_bytes();
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&resp).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                "STARTTLS" => config.starttls_response.as_ref().map_or_else(
                    || {
                        (
                            SmtpResponse::new(502, "Command not implemented").to_bytes(),
                            SmtpCommand::StartTls,
                        )
                    },
                    |starttls_resp| (starttls_resp.to_bytes(), SmtpCommand::StartTls),
                ),
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            // Store command
            commands.write().await.push(smtp_cmd.clone());

            // Handle DATA content if we just sent the go-ahead
            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                writer.write_all(&response).await?;
                writer.flush().await?;

                command_count.fetch_add(1, Ordering::Relaxed);

                // Read content until the terminating dot line, keeping
                // the bytes exactly as transferred
                let mut message_content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    let bytes_read = reader.read_line(&mut data_line).await?;
                    if bytes_read == 0 {
                        break;
                    }

                    if data_line.trim() == "." {
                        // End of message
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content.clone()));

                        // Send data end response
                        if let Some(delay) = config.response_delay {
                            tokio::time::sleep(delay).await;
                        }
                        writer
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        writer.flush().await?;
                        break;
                    }

                    message_content.extend_from_slice(data_line.as_bytes());
                }
                continue;
            }

            // Apply response delay if configured
            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }

            // Send response
            writer.write_all(&response).await?;
            writer.flush().await?;
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Set the EHLO response code and capability lines
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_response = EhloResponse { code, capabilities };
        self
    }

    /// Set the MAIL FROM response
    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Set a single RCPT TO response used for every recipient
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_responses = vec![SmtpResponse::new(code, message)];
        self
    }

    /// Set one RCPT TO response per recipient, in order; the last
    /// entry repeats for any further recipients
    #[must_use]
    pub fn with_rcpt_to_responses(mut self, responses: &[(u16, &str)]) -> Self {
        self.config.rcpt_to_responses = responses
            .iter()
            .map(|(code, message)| SmtpResponse::new(*code, *message))
            .collect();
        self
    }

    /// Set the DATA command response
    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Set a single AUTH response
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_responses = vec![SmtpResponse::new(code, message)];
        self
    }

    /// Set the AUTH responses consumed step by step; a 334 makes the
    /// server read the next line as challenge data
    #[must_use]
    pub fn with_auth_responses(mut self, responses: &[(u16, &str)]) -> Self {
        self.config.auth_responses = responses
            .iter()
            .map(|(code, message)| SmtpResponse::new(*code, *message))
            .collect();
        self
    }

    /// Set the QUIT response
    #[must_use]
    pub fn with_quit_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.quit_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the STARTTLS response (without it STARTTLS gets a 502)
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = Some(SmtpResponse::new(code, message));
        self
    }

    /// Add a delay before the greeting is sent
    #[must_use]
    pub const fn with_connection_delay(mut self, delay: Duration) -> Self {
        self.config.connection_delay = Some(delay);
        self
    }

    /// Add a delay before sending each response
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Drop the connection after N commands
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Hang on the Nth command (0-indexed)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        // Bind to a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let command_count = Arc::new(AtomicUsize::new(0));

        // Spawn server task
        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);
        let command_count_clone = Arc::clone(&command_count);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);
                    let command_count = Arc::clone(&command_count_clone);

                    tokio::spawn(async move {
                        if let Err(e) =
                            MockSmtpServer::handle_client(stream, config, commands, command_count)
                                .await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
            command_count,
        })
    }
}
