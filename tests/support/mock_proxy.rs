//! Mock HTTP CONNECT proxy for exercising the tunnel path
//!
//! Accepts a CONNECT request, answers with a configurable status and,
//! on success, relays bytes between the client and the target. The
//! received request heads are recorded for assertions. With greeting
//! coalescing enabled the proxy reads the target's greeting first and
//! sends it in the same write as its own response header, so bytes
//! past the header block reach the client before its first read.

#![allow(dead_code)] // Test utility module, not every test uses every knob

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// Largest request head the proxy will buffer
const MAX_HEAD: usize = 8192;

#[derive(Clone)]
struct MockProxyConfig {
    target: Option<SocketAddr>,
    status: (u16, String),
    coalesce_greeting: bool,
}

impl Default for MockProxyConfig {
    fn default() -> Self {
        Self {
            target: None,
            status: (200, "Connection established".to_string()),
            coalesce_greeting: false,
        }
    }
}

/// Mock HTTP CONNECT proxy for testing
pub struct MockHttpProxy {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockHttpProxy {
    /// Create a new builder for configuring the mock proxy
    #[must_use]
    pub fn builder() -> MockHttpProxyBuilder {
        MockHttpProxyBuilder::new()
    }

    /// Get the address the proxy is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the request heads received so far
    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }

    /// Shutdown the proxy
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Handle a single tunnel
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockProxyConfig>,
        requests: Arc<RwLock<Vec<String>>>,
    ) -> Result<(), std::io::Error> {
        // Read the request head up to the blank line
        let mut head = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            head.extend_from_slice(&chunk[..n]);

            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
            if head.len() > MAX_HEAD {
                return Ok(());
            }
        }

        requests
            .write()
            .await
            .push(String::from_utf8_lossy(&head).into_owned());

        let (code, reason) = &config.status;
        if *code != 200 {
            stream
                .write_all(format!("HTTP/1.1 {code} {reason}\r\n\r\n").as_bytes())
                .await?;
            stream.flush().await?;
            return Ok(());
        }

        let Some(target) = config.target else {
            // Accepted but nowhere to relay to; just close
            return Ok(());
        };

        let mut upstream = TcpStream::connect(target).await?;

        let mut response = format!("HTTP/1.1 {code} {reason}\r\n\r\n").into_bytes();
        if config.coalesce_greeting {
            // Pull the target's greeting and ship it with the header
            let mut greeting = [0u8; 512];
            let n = upstream.read(&mut greeting).await?;
            response.extend_from_slice(&greeting[..n]);
        }
        stream.write_all(&response).await?;
        stream.flush().await?;

        tokio::io::copy_bidirectional(&mut stream, &mut upstream).await?;

        Ok(())
    }
}

/// Builder for configuring a `MockHttpProxy`
pub struct MockHttpProxyBuilder {
    config: MockProxyConfig,
}

impl MockHttpProxyBuilder {
    fn new() -> Self {
        Self {
            config: MockProxyConfig::default(),
        }
    }

    /// Set the address CONNECT tunnels are relayed to
    #[must_use]
    pub const fn with_target(mut self, target: SocketAddr) -> Self {
        self.config.target = Some(target);
        self
    }

    /// Set the response status; anything but 200 refuses the tunnel
    #[must_use]
    pub fn with_status(mut self, code: u16, reason: impl Into<String>) -> Self {
        self.config.status = (code, reason.into());
        self
    }

    /// Send the target's greeting in the same write as the response
    /// header
    #[must_use]
    pub const fn with_coalesced_greeting(mut self) -> Self {
        self.config.coalesce_greeting = true;
        self
    }

    /// Build and start the mock proxy
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy fails to bind to a port
    pub async fn build(self) -> Result<MockHttpProxy, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let requests = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let requests_clone = Arc::clone(&requests);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let requests = Arc::clone(&requests_clone);

                    tokio::spawn(async move {
                        if let Err(e) =
                            MockHttpProxy::handle_client(stream, config, requests).await
                        {
                            tracing::debug!("Mock proxy client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockHttpProxy {
            addr,
            requests,
            shutdown,
        })
    }
}
