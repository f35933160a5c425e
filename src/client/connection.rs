//! SMTP connection handling over plain TCP, an HTTP CONNECT tunnel and
//! TLS.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::source::ContentSource;
use crate::{incoming, outgoing};

use super::error::{ClientError, Result};
use super::response::Response;

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Number of content bytes pulled from a source per write during DATA.
const CHUNK_SIZE: usize = 8192;

/// The underlying stream, either plain TCP or TLS-wrapped.
#[derive(Debug)]
enum Connection {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl Connection {
    /// Sends data over the connection.
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    /// Reads data from the connection into the provided buffer.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Performs the TLS handshake over an established plain stream.
    async fn upgrade_to_tls(
        self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<Self> {
        match self {
            Self::Plain(stream) => {
                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|err| ClientError::TlsError(err.to_string()))?;

                Ok(Self::Tls(tls_stream))
            }
            Self::Tls(_) => Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            )),
        }
    }
}

/// An SMTP connection for sending commands and receiving responses.
///
/// Certificate policy is not decided at this layer: the connector
/// handed to [`starttls`](Self::starttls) is built by the caller
/// against its trust store and nothing here can weaken it.
#[derive(Debug)]
pub struct SmtpConnection {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    verbose: bool,
}

impl SmtpConnection {
    /// Connects directly to the given address.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Io)?;

        Ok(Self::from_stream(stream))
    }

    /// Connects to `proxy_addr` and asks it to open a tunnel to
    /// `host:port` with an HTTP CONNECT request.
    ///
    /// Bytes the proxy delivers past its own response header already
    /// belong to the SMTP session and are kept for the first read.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy is unreachable, closes early, or
    /// answers CONNECT with anything but status 200.
    pub async fn connect_via_proxy(proxy_addr: &str, host: &str, port: u16) -> Result<Self> {
        let mut stream = TcpStream::connect(proxy_addr)
            .await
            .map_err(ClientError::Io)?;

        let request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;

        // Read up to the end of the response header block.
        let mut header = Vec::with_capacity(BUFFER_SIZE);
        let mut chunk = [0u8; BUFFER_SIZE];
        let body_start = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ClientError::Proxy(
                    "Connection closed before the CONNECT response completed".to_string(),
                ));
            }
            header.extend_from_slice(&chunk[..n]);

            if let Some(end) = header.windows(4).position(|w| w == b"\r\n\r\n") {
                break end + 4;
            }
            if header.len() > MAX_BUFFER_SIZE {
                return Err(ClientError::Proxy(
                    "CONNECT response too large".to_string(),
                ));
            }
        };

        let status_line = std::str::from_utf8(&header[..body_start])?
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        // "HTTP/1.1 200 Connection established"
        if status_line.split_whitespace().nth(1) != Some("200") {
            return Err(ClientError::Proxy(format!(
                "CONNECT rejected: {status_line}"
            )));
        }

        let mut client = Self::from_stream(stream);

        let leftover = &header[body_start..];
        if !leftover.is_empty() {
            if client.buffer.len() < leftover.len() {
                client.buffer.resize(leftover.len(), 0);
            }
            client.buffer[..leftover.len()].copy_from_slice(leftover);
            client.buffer_pos = leftover.len();
        }

        Ok(client)
    }

    fn from_stream(stream: TcpStream) -> Self {
        Self {
            connection: Some(Connection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            verbose: false,
        }
    }

    /// Sets whether the protocol exchange is logged at info level
    /// instead of trace.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Reads the initial server greeting (220 response).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is invalid.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a command to the server without awaiting a response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        self.transmit(command, command).await
    }

    /// Sends a command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Sends a command whose text must stay out of the logs, recording
    /// `display` in its place.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command_redacted(&mut self, command: &str, display: &str) -> Result<Response> {
        self.transmit(command, display).await?;
        self.read_response().await
    }

    /// Sends EHLO with the specified name.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, name: &str) -> Result<Response> {
        self.command(&format!("EHLO {name}")).await
    }

    /// Sends STARTTLS and, on acceptance, performs the TLS handshake.
    ///
    /// The read buffer is dropped on upgrade; bytes received before
    /// the handshake must not carry into the protected session.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange or the handshake fails. A
    /// refusal is not an error; the refusing response is returned.
    pub async fn starttls(
        &mut self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let Some(connection) = self.connection.take() else {
                return Err(ClientError::ConnectionClosed);
            };
            self.connection = Some(connection.upgrade_to_tls(connector, server_name).await?);
            self.buffer_pos = 0;
        }

        Ok(response)
    }

    /// Sends MAIL FROM, declaring the message size when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str, size: Option<usize>) -> Result<Response> {
        let command = if let Some(size) = size {
            format!("MAIL FROM:<{from}> SIZE={size}")
        } else {
            format!("MAIL FROM:<{from}>")
        };
        self.command(&command).await
    }

    /// Sends RCPT TO.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Streams message content after an accepted DATA, ending with the
    /// terminator, and reads the final response.
    ///
    /// Content is pulled from the source in bounded chunks. Bare LF
    /// line endings are widened to CRLF and lines starting with a dot
    /// are stuffed, both correctly across chunk boundaries.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn stream_data<S: ContentSource>(&mut self, source: &mut S) -> Result<Response> {
        let mut encoder = DataEncoder::new();
        let mut encoded = Vec::with_capacity(CHUNK_SIZE + CHUNK_SIZE / 4);

        loop {
            let chunk = source.next_chunk(CHUNK_SIZE);
            if chunk.is_empty() {
                break;
            }

            encoded.clear();
            encoder.encode(chunk, &mut encoded);
            self.connection_mut()?.send(&encoded).await?;
        }

        encoded.clear();
        encoder.finish(&mut encoded);
        self.connection_mut()?.send(&encoded).await?;

        self.read_response().await
    }

    /// Sends QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(ClientError::ConnectionClosed)
    }

    async fn transmit(&mut self, command: &str, shown: &str) -> Result<()> {
        if self.verbose {
            outgoing!(level = INFO, "{shown}");
        } else {
            outgoing!("{shown}");
        }

        let data = format!("{command}\r\n");
        self.connection_mut()?.send(data.as_bytes()).await
    }

    /// Reads a complete SMTP response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            // Try to parse a complete response from the buffer
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                // Remove consumed bytes from buffer
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                if self.verbose {
                    incoming!(level = INFO, "{} {}", response.code, response.message());
                } else {
                    incoming!("{} {}", response.code, response.message());
                }

                return Ok(response);
            }

            // Need more data - read from connection
            if self.buffer_pos >= self.buffer.len() {
                // Buffer is full but no complete response - expand buffer
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

/// Incremental transfer encoding for the DATA phase.
///
/// Tracks line state across chunk boundaries so a dot or line ending
/// split between two chunks is still handled.
struct DataEncoder {
    at_line_start: bool,
    prev_cr: bool,
}

impl DataEncoder {
    const fn new() -> Self {
        Self {
            at_line_start: true,
            prev_cr: false,
        }
    }

    /// Appends the encoded form of `input` to `out`.
    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            match byte {
                b'\n' => {
                    if !self.prev_cr {
                        out.push(b'\r');
                    }
                    out.push(b'\n');
                    self.at_line_start = true;
                    self.prev_cr = false;
                }
                b'\r' => {
                    out.push(b'\r');
                    self.at_line_start = false;
                    self.prev_cr = true;
                }
                b'.' if self.at_line_start => {
                    out.extend_from_slice(b"..");
                    self.at_line_start = false;
                    self.prev_cr = false;
                }
                other => {
                    out.push(other);
                    self.at_line_start = false;
                    self.prev_cr = false;
                }
            }
        }
    }

    /// Closes an unterminated final line and appends the end-of-data
    /// marker.
    fn finish(self, out: &mut Vec<u8>) {
        if !self.at_line_start {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");
    }
}
