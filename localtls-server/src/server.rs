//! HTTPS accept loop
//!
//! TLS material is loaded before the port is bound, so a bad key or
//! certificate means nothing ever listens. Each accepted connection runs on
//! its own task: TLS handshake, then HTTP/1.1 or HTTP/2 via hyper's auto
//! builder.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use crate::config::ListenerConfig;
use crate::service;
use crate::tls::{self, TlsError};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to read local address: {0}")]
    LocalAddr(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

pub struct HttpsServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    local_addr: SocketAddr,
}

impl HttpsServer {
    /// Load TLS material and bind the listening socket
    pub async fn bind(config: &ListenerConfig) -> Result<Self> {
        let tls_config = tls::load_server_config(&config.cert_path, &config.key_path)?;

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        tracing::info!(
            listen = %local_addr,
            cert_path = %config.cert_path.display(),
            "HTTPS listener bound"
        );

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls_config),
            local_addr,
        })
    }

    /// Address the listener is bound to (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(listen = %self.local_addr, "HTTPS listener stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let acceptor = self.acceptor.clone();
                    tokio::spawn(serve_connection(acceptor, stream, peer));
                }
            }
        }
    }
}

async fn serve_connection(acceptor: TlsAcceptor, stream: TcpStream, peer: SocketAddr) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(tls_stream) => tls_stream,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "TLS handshake failed");
            return;
        }
    };

    let alpn = tls_stream
        .get_ref()
        .1
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned());
    tracing::debug!(peer = %peer, alpn = ?alpn, "TLS handshake complete");

    let io = TokioIo::new(tls_stream);
    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(io, service_fn(service::hello::<Incoming>))
        .await
    {
        tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> ListenerConfig {
        ListenerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            cert_path: temp.path().join("server.crt"),
            key_path: temp.path().join("server.key"),
        }
    }

    #[tokio::test]
    async fn bind_fails_without_tls_material() {
        let temp = TempDir::new().unwrap();
        let err = HttpsServer::bind(&config_in(&temp)).await.err().unwrap();
        assert!(matches!(err, ServerError::Tls(TlsError::Read(_, _))));
    }

    #[tokio::test]
    async fn bind_resolves_ephemeral_port_and_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        localtls::Provisioner::from_dir(temp.path())
            .unwrap()
            .run_all(false)
            .unwrap();

        let server = HttpsServer::bind(&config_in(&temp)).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);

        server.run_until(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn bind_reports_address_in_use() {
        let temp = TempDir::new().unwrap();
        localtls::Provisioner::from_dir(temp.path())
            .unwrap()
            .run_all(false)
            .unwrap();

        let first = HttpsServer::bind(&config_in(&temp)).await.unwrap();
        let config = ListenerConfig {
            listen: first.local_addr(),
            cert_path: temp.path().join("server.crt"),
            key_path: temp.path().join("server.key"),
        };
        let err = HttpsServer::bind(&config).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
