//! Configuration for the submission engine and the interactive front
//! end.
//!
//! A [`Profile`] is an optional TOML file that pre-answers prompts so
//! repeated submissions do not have to retype endpoints and login
//! details. [`Timeouts`] bounds each network phase; every value has a
//! default and can be overridden per field.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

/// Per-phase deadlines for a submission, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Timeout for establishing the TCP connection (and the proxy
    /// tunnel, when one is used).
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Timeout for each SMTP command exchange (greeting, EHLO,
    /// STARTTLS, AUTH, MAIL FROM, RCPT TO, DATA initiation).
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// Timeout for streaming the message content and receiving the
    /// final acceptance.
    ///
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// Timeout for QUIT. Expiry does not fail an already accepted
    /// submission.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::quit_secs")]
    pub quit_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            command_secs: defaults::command_secs(),
            data_secs: defaults::data_secs(),
            quit_secs: defaults::quit_secs(),
        }
    }
}

impl Timeouts {
    /// Timeout for establishing the connection.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Timeout for a single command exchange.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    /// Timeout for the content transfer.
    #[must_use]
    pub const fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    /// Timeout for the closing QUIT exchange.
    #[must_use]
    pub const fn quit_timeout(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

/// Saved answers for the interactive front end.
///
/// Any field left out of the file is prompted for at run time;
/// recipients listed here are used as-is without prompting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub sender: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub recipients: Vec<String>,

    /// Name presented in EHLO. Defaults to `localhost`.
    #[serde(default)]
    pub helo_name: Option<String>,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub timeouts: Timeouts,
}

impl Profile {
    /// Loads a profile from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or does
    /// not parse as a profile.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config from {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Default timeout values.
mod defaults {
    pub const fn connect_secs() -> u64 {
        30
    }
    pub const fn command_secs() -> u64 {
        30
    }
    pub const fn data_secs() -> u64 {
        120 // 2 minutes
    }
    pub const fn quit_secs() -> u64 {
        10
    }
}
