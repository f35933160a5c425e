//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// A single line of an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// A complete SMTP response, which may span multiple lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    /// Creates a new `Response`.
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The full message text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` for a 2xx (success) code.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` for a 3xx (intermediate) code, such as the 354
    /// go-ahead after DATA or a 334 AUTH challenge.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Returns `true` for a 4xx (temporary error) code.
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// Returns `true` for a 5xx (permanent error) code.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Returns `true` for any error (4xx or 5xx) code.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_temporary_error() || self.is_permanent_error()
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match the
    /// SMTP response format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code_text = line.get(..3).ok_or_else(|| {
            ClientError::ParseError(format!("Response line too short: '{line}'"))
        })?;

        let code = code_text.parse::<u16>().map_err(|_| {
            ClientError::ParseError(format!("Invalid status code: '{code_text}'"))
        })?;

        // A space after the code ends the response, a dash continues it.
        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(&other) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    other as char
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete response from the front of `buffer`.
    ///
    /// Returns the response and the number of bytes consumed, or
    /// `None` when the buffer does not yet hold a full response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the buffered bytes are
    /// malformed, including a status code change mid-response.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        // A multi-byte sequence torn at the tail of a read completes
        // on the next one; only invalid bytes are a hard error.
        let text = match std::str::from_utf8(buffer) {
            Ok(text) => text,
            Err(err) if err.error_len().is_none() => {
                std::str::from_utf8(&buffer[..err.valid_up_to()])?
            }
            Err(err) => return Err(err.into()),
        };

        let mut lines = Vec::new();
        let mut code = None;
        let mut consumed = 0;

        while let Some(end) = text[consumed..].find('\n') {
            let raw_line = &text[consumed..consumed + end];
            consumed += end + 1;

            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            if line.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(line)?;
            match code {
                None => code = Some(parsed.code),
                Some(code) if parsed.code != code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        // Need more data
        Ok(None)
    }
}
