//! One-shot SMTP submission client
//!
//! This crate provides functionality to:
//! - Model a structured email message and its raw wire form
//! - Stream message content in bounded chunks
//! - Submit a message to a server over verified TLS and report a single
//!   success-or-failure outcome

pub mod address;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod message;
pub mod source;

pub use tracing;

// Re-export core types
pub use engine::{submit, Receipt, SubmitOptions, Submission};
// Re-export error types
pub use error::{SubmitError, SubmissionError, TransportError, ValidationError};
// Re-export the message model
pub use message::{Credentials, Message, RawMessage};
pub use source::ContentSource;
