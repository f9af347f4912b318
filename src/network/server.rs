//! HTTP listener for the control routes and proxied traffic

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::routes;
use super::SHUTDOWN_TIMEOUT_MS;
use crate::proxy::RecordingHandler;
use crate::{RecplayError, Result};

/// Accept loop serving one `RecordingHandler`.
///
/// Connections beyond `server.max_connections` are refused. Cancelling the
/// shutdown token stops accepting, lets in-flight connections finish
/// within the shutdown timeout, and cancels pending playback delays.
pub struct ProxyServer {
    handler: Arc<RecordingHandler>,
    listener: TcpListener,
    connections: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl ProxyServer {
    /// Bind the listener from the handler's configuration
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound.
    pub async fn bind(handler: Arc<RecordingHandler>) -> Result<Self> {
        let server = &handler.config().server;
        let addr = format!("{}:{}", server.host, server.port);
        let listener = TcpListener::bind(&addr).await?;
        let connections = Arc::new(Semaphore::new(server.max_connections));

        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            handler,
            listener,
            connections,
            shutdown: CancellationToken::new(),
        })
    }

    /// Address actually bound, useful with port 0
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the server when cancelled
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until Ctrl-C or the shutdown token fires
    ///
    /// # Errors
    ///
    /// Returns error if waiting for the signal fails.
    pub async fn run(self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let signal = async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    result.map_err(RecplayError::from)
                }
                () = shutdown.cancelled() => {
                    info!("Received shutdown signal");
                    Ok(())
                }
            }
        };
        self.serve_until(signal).await
    }

    async fn serve_until(
        self,
        signal: impl std::future::Future<Output = Result<()>>,
    ) -> Result<()> {
        let mut tasks = JoinSet::new();
        tokio::pin!(signal);

        let outcome = loop {
            tokio::select! {
                result = &mut signal => break result,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let Ok(permit) = Arc::clone(&self.connections).try_acquire_owned() else {
                            warn!(peer = %peer, "connection limit reached, rejecting");
                            drop(stream);
                            continue;
                        };
                        tasks.spawn(serve_connection(
                            stream,
                            peer,
                            permit,
                            Arc::clone(&self.handler),
                            self.shutdown.child_token(),
                        ));
                    }
                    Err(e) => error!(error = %e, "accept error"),
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "connection task failed");
                    }
                }
            }
        };

        // Graceful shutdown
        self.shutdown.cancel();
        let drained = tokio::time::timeout(Duration::from_millis(SHUTDOWN_TIMEOUT_MS), async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "task cleanup error");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "shutdown timeout, aborting connections");
            tasks.abort_all();
        }

        info!("Shutdown complete");
        outcome
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
    handler: Arc<RecordingHandler>,
    shutdown: CancellationToken,
) {
    debug!(peer = %peer, "connection accepted");
    let request_cancel = shutdown.clone();
    let service = service_fn(move |request| {
        let handler = Arc::clone(&handler);
        let cancel = request_cancel.child_token();
        async move { Ok::<_, Infallible>(routes::route(&handler, request, &cancel).await) }
    });

    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "connection closed with error");
            }
        }
        () = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            if let Err(e) = connection.await {
                debug!(peer = %peer, error = %e, "connection closed during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    async fn server(max_connections: usize) -> ProxyServer {
        let mut config = Config::default();
        config.storage_location = std::env::temp_dir();
        config.server.port = 0;
        config.server.max_connections = max_connections;
        let handler = Arc::new(RecordingHandler::new(config).unwrap());
        ProxyServer::bind(handler).await.unwrap()
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = server(4).await;
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let server = server(4).await;
        let shutdown = server.shutdown_token();

        let handle = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
