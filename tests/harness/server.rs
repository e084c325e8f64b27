//! Standalone echo server for client-role runs.

use std::net::SocketAddr;
use std::sync::Arc;

use ccubench::{BenchConfig, EchoServer, ErrorClassifier, Framing};

pub struct TestServer {
    server: EchoServer,
    errors: Arc<ErrorClassifier>,
}

impl TestServer {
    /// Echo server on a random port.
    pub async fn spawn(framing: Framing) -> Self {
        Self::bind(framing, true).await
    }

    /// Server that accepts and greets but never echoes.
    pub async fn silent(framing: Framing) -> Self {
        Self::bind(framing, false).await
    }

    async fn bind(framing: Framing, echo: bool) -> Self {
        let config = BenchConfig::new()
            .with_framing(framing)
            .with_endpoint("127.0.0.1", 0);
        let errors = Arc::new(ErrorClassifier::new());
        let server = EchoServer::bind(&config, echo, errors.clone())
            .await
            .expect("bind test server");
        Self { server, errors }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    pub fn accepted(&self) -> u64 {
        self.server.stats().accepted()
    }

    pub fn errors(&self) -> &ErrorClassifier {
        &self.errors
    }

    pub async fn stop(self) {
        self.server.stop().await;
    }
}
