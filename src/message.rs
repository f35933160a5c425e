//! The message model: credentials, the structured message, and its raw
//! wire form.

use std::fmt::{self, Debug};

use crate::error::ValidationError;

/// Login secret pair used for SMTP authentication.
///
/// Owned exclusively by the [`Message`] it authenticates.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The login username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The login password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The serialized wire form of a message plus a read cursor.
///
/// The data is write-once. Only the cursor moves, and only forward,
/// through [`ContentSource::next_chunk`](crate::source::ContentSource::next_chunk);
/// a message is therefore good for exactly one transmission pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub(crate) data: Vec<u8>,
    pub(crate) cursor: usize,
}

impl RawMessage {
    /// Wraps already-serialized bytes with the cursor at the start.
    #[must_use]
    pub const fn new(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }

    /// Total length of the serialized data in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the serialized data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read offset into the data.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes not yet consumed by the reader.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// The full serialized data, independent of the cursor.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// One outgoing email submission: endpoints, credentials, envelope
/// addressing and raw content.
///
/// Built once from caller input and consumed by a single submission
/// attempt. The raw form is computed at build time and no field
/// mutation is exposed afterwards.
#[derive(Debug, Clone)]
pub struct Message {
    proxy_address: Option<String>,
    server_address: String,
    credentials: Credentials,
    sender: String,
    recipients: Vec<String>,
    subject: String,
    body_text: String,
    raw: RawMessage,
}

impl Message {
    /// Builds a message, serializing the raw wire form up front.
    ///
    /// The `To` header carries all recipients comma-joined inside a
    /// single angle-bracket pair, the header block is terminated by an
    /// empty line, and the body is appended verbatim with no trailing
    /// newline added or stripped. A blank proxy string is treated the
    /// same as no proxy.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the server address, the sender
    /// or the recipient list is empty.
    pub fn build(
        proxy_address: Option<String>,
        server_address: impl Into<String>,
        credentials: Credentials,
        sender: impl Into<String>,
        recipients: Vec<String>,
        subject: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let server_address = server_address.into();
        let sender = sender.into();
        let subject = subject.into();
        let body_text = body_text.into();

        if server_address.trim().is_empty() {
            return Err(ValidationError::EmptyServer);
        }
        if sender.trim().is_empty() {
            return Err(ValidationError::EmptySender);
        }
        if recipients.is_empty() {
            return Err(ValidationError::NoRecipients);
        }

        let raw = serialize(&sender, &recipients, &subject, &body_text);

        Ok(Self {
            proxy_address: proxy_address.filter(|proxy| !proxy.trim().is_empty()),
            server_address,
            credentials,
            sender,
            recipients,
            subject,
            body_text,
            raw,
        })
    }

    /// The proxy to tunnel through, if any.
    #[must_use]
    pub fn proxy_address(&self) -> Option<&str> {
        self.proxy_address.as_deref()
    }

    /// The SMTP server address as supplied by the caller.
    #[must_use]
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// The credentials used for AUTH.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The envelope sender address.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The envelope recipients, in RCPT order.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// The `Subject` header value.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The body text, exactly as supplied.
    #[must_use]
    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    /// The serialized wire form.
    #[must_use]
    pub const fn raw(&self) -> &RawMessage {
        &self.raw
    }

    pub(crate) fn raw_mut(&mut self) -> &mut RawMessage {
        &mut self.raw
    }
}

/// Serializes the header block and body into the exact bytes that go
/// over the wire during DATA.
fn serialize(sender: &str, recipients: &[String], subject: &str, body: &str) -> RawMessage {
    let header = format!(
        "From: <{sender}>\r\nTo: <{}>\r\nSubject: {subject}\r\n\r\n",
        recipients.join(", ")
    );

    let mut data = header.into_bytes();
    data.extend_from_slice(body.as_bytes());

    RawMessage::new(data)
}
