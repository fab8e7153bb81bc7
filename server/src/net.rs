//! TCP listener and server assembly

use crate::board::BoardLayout;
use crate::liveness::ProbeConfig;
use crate::session::{self, Services};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Accepts connections on one TCP port and spawns a session per client.
///
/// All shared state lives in the `Services` bundle handed to each session;
/// the server itself owns nothing but the listener.
pub struct Server {
    listener: TcpListener,
    services: Arc<Services>,
}

impl Server {
    /// Binds the listening socket. This is the only fatal startup error;
    /// everything after it is isolated per connection.
    pub async fn bind(addr: &str, probe: ProbeConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        let services = Arc::new(Services::new(Arc::new(BoardLayout::standard()), probe));
        Ok(Self { listener, services })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn services(&self) -> Arc<Services> {
        Arc::clone(&self.services)
    }

    /// Runs the accept loop forever. A failed accept is logged and retried
    /// after a short pause; it never takes the server down.
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!("Accepted connection from {}", peer);
                    let services = Arc::clone(&self.services);
                    tokio::spawn(async move {
                        session::handle_connection(stream, peer, services).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0", ProbeConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = Server::bind("127.0.0.1:0", ProbeConfig::default())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();

        let second = Server::bind(&addr.to_string(), ProbeConfig::default()).await;
        assert!(second.is_err());
    }
}
