//! SMTP client transport: connection handling, response parsing,
//! capability tracking and authentication.
//!
//! This layer speaks the protocol one exchange at a time and knows
//! nothing about submission policy. Deadlines, retries-or-not and the
//! order of operations all live with the caller; here a command is
//! sent, a response is parsed, and status classification is left to
//! [`Response`].

mod auth;
mod connection;
mod error;
mod extensions;
mod response;

pub use auth::authenticate;
pub use connection::SmtpConnection;
pub use error::{ClientError, Result};
pub use extensions::ServerExtensions;
pub use response::{Response, ResponseLine};
