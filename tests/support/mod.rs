//! Shared test support: mock endpoints for driving the client without
//! a real server.

pub mod mock_proxy;
pub mod mock_server;
