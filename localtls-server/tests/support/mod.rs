use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use localtls::{ArtifactPaths, Provisioner};
use localtls_server::{HttpsServer, ListenerConfig, tls};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Freshly provisioned CA, key and certificate in a temporary directory
pub struct Provisioned {
    pub paths: ArtifactPaths,
    dir: TempDir,
}

impl Provisioned {
    /// Provisioner over the same directory, for running single steps
    pub fn provisioner(&self) -> Provisioner {
        Provisioner::from_dir(self.dir.path()).unwrap()
    }
}

pub fn provision() -> Provisioned {
    let dir = TempDir::new().unwrap();
    let report = Provisioner::from_dir(dir.path())
        .unwrap()
        .run_all(false)
        .unwrap();
    Provisioned {
        paths: report.paths,
        dir,
    }
}

/// Listener running on an ephemeral loopback port
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<localtls_server::server::Result<()>>,
}

impl RunningServer {
    pub async fn start(cert_path: &Path, key_path: &Path) -> Self {
        let config = ListenerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            cert_path: cert_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
        };
        let server = HttpsServer::bind(&config).await.unwrap();
        let addr = server.local_addr();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(IO_TIMEOUT, self.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

/// TLS client trusting only the given root CA
pub fn connector_trusting(ca_cert_path: &Path, alpn: &[&[u8]]) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    for cert in tls::load_certs(ca_cert_path).unwrap() {
        roots.add(cert).unwrap();
    }

    let mut config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    TlsConnector::from(Arc::new(config))
}

pub async fn connect(
    connector: &TlsConnector,
    addr: SocketAddr,
    host: &str,
) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let server_name = ServerName::try_from(host.to_string()).unwrap();
    tokio::time::timeout(IO_TIMEOUT, connector.connect(server_name, tcp))
        .await
        .unwrap()
}

/// Send a raw HTTP/1.1 request and collect everything until the peer closes
pub async fn send_raw<S>(stream: &mut S, request: &str) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(IO_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => response.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&response).into_owned()
}
