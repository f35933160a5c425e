//! Capabilities advertised by the server in its EHLO response.

use super::response::Response;

/// The subset of EHLO keywords the submission engine acts on.
///
/// STARTTLS gates the mandatory TLS upgrade, AUTH lists the mechanisms
/// the server accepts, and SIZE (RFC 1870) carries the maximum message
/// size, where a missing or zero value means the server declared no
/// limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerExtensions {
    starttls: bool,
    auth_mechanisms: Vec<String>,
    size: Option<usize>,
}

impl ServerExtensions {
    /// Extracts capabilities from an EHLO response.
    ///
    /// The first line is the server's identification and is skipped;
    /// every other line is one keyword with optional parameters.
    /// Unknown keywords are ignored.
    #[must_use]
    pub fn from_response(response: &Response) -> Self {
        let mut extensions = Self::default();

        for line in response.lines.iter().skip(1) {
            let mut tokens = line.split_whitespace();
            let Some(keyword) = tokens.next() else {
                continue;
            };

            match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => extensions.starttls = true,
                "AUTH" => extensions
                    .auth_mechanisms
                    .extend(tokens.map(str::to_ascii_uppercase)),
                "SIZE" => {
                    extensions.size = Some(tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0));
                }
                other => {
                    // Some older servers advertise "AUTH=PLAIN LOGIN".
                    if let Some(first) = other.strip_prefix("AUTH=") {
                        if !first.is_empty() {
                            extensions.auth_mechanisms.push(first.to_string());
                        }
                        extensions
                            .auth_mechanisms
                            .extend(tokens.map(str::to_ascii_uppercase));
                    }
                }
            }
        }

        extensions
    }

    /// Whether the server advertised STARTTLS.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
    }

    /// Whether the server advertised the given AUTH mechanism.
    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.auth_mechanisms
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mechanism))
    }

    /// The advertised AUTH mechanisms, uppercased, in advertisement
    /// order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[String] {
        &self.auth_mechanisms
    }

    /// Whether the server advertised SIZE at all.
    #[must_use]
    pub const fn advertises_size(&self) -> bool {
        self.size.is_some()
    }

    /// The advertised maximum message size in bytes.
    ///
    /// `None` when SIZE was not advertised or the server declared no
    /// limit.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.size.filter(|&max| max > 0)
    }
}
