//! TCP accept loop: binds a listener and spawns
//! one `tokio::task` per accepted connection, each driving
//! [`Exchange::serve_connection`] to completion.
//!
//! Accept, then hand the stream to a per-connection driver, built
//! directly on `tokio::net::TcpListener` rather than a generic `Accept`
//! trait, since this crate has exactly one transport to support.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::error::Error;
use crate::exchange::Exchange;
use crate::server::shutdown::GracefulShutdown;

/// A bound listener paired with the [`Exchange`] it dispatches every
/// accepted connection to.
pub struct Server {
    listener: TcpListener,
    exchange: Arc<Exchange>,
}

impl Server {
    /// Binds `addr` and pairs the listener with `exchange`.
    pub async fn bind(addr: SocketAddr, exchange: Exchange) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await.map_err(Error::new_listen)?;
        Ok(Server {
            listener,
            exchange: Arc::new(exchange),
        })
    }

    /// The address actually bound, useful when `addr` used port `0`.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener.local_addr().map_err(Error::new_listen)
    }

    /// Accepts connections until the process is interrupted; each
    /// connection runs on its own task and keeps running past a slow
    /// client regardless of how long other connections take.
    pub async fn serve(self) -> Result<(), Error> {
        self.exchange.events.on_server_started();
        loop {
            let (stream, _peer) = self.accept().await?;
            let exchange = self.exchange.clone();
            tokio::spawn(async move {
                exchange.serve_connection(stream).await;
            });
        }
    }

    /// Like [`Server::serve`], but stops accepting new connections once
    /// `shutdown.shutdown()` is called elsewhere, and returns only after
    /// every connection already in flight has completed.
    pub async fn serve_with_shutdown(self, shutdown: GracefulShutdown) -> Result<(), Error> {
        self.exchange.events.on_server_started();
        loop {
            tokio::select! {
                accepted = self.accept() => {
                    let (stream, _peer) = accepted?;
                    let exchange = self.exchange.clone();
                    let guard = shutdown.track();
                    tokio::spawn(async move {
                        exchange.serve_connection(stream).await;
                        drop(guard);
                    });
                }
                _ = shutdown.shutdown_signaled() => break,
            }
        }
        shutdown.drained().await;
        self.exchange.events.on_server_stopped();
        Ok(())
    }

    async fn accept(&self) -> Result<(TcpStream, SocketAddr), Error> {
        self.listener.accept().await.map_err(Error::new_accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Builder;

    #[tokio::test]
    async fn binds_ephemeral_port_and_reports_local_addr() {
        let exchange = Builder::new().build();
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), exchange)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
