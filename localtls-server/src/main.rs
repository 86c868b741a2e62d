use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use localtls_server::config::{DEFAULT_CERT_PATH, DEFAULT_KEY_PATH};
use localtls_server::tls::install_rustls_crypto_provider;
use localtls_server::{HttpsServer, ListenerConfig};
use tracing_subscriber::EnvFilter;

/// localtls-server - HTTPS listener for the localtls certificates
#[derive(Parser)]
#[command(name = "localtls-server")]
#[command(version)]
#[command(about = "HTTPS listener answering every request with Hello, World!")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LOCALTLS_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Server certificate (PEM)
    #[arg(long, env = "LOCALTLS_CERT", default_value = DEFAULT_CERT_PATH)]
    pub cert: PathBuf,

    /// Server private key (PEM)
    #[arg(long, env = "LOCALTLS_KEY", default_value = DEFAULT_KEY_PATH)]
    pub key: PathBuf,
}

impl Args {
    fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            listen: self.listen,
            cert_path: self.cert.clone(),
            key_path: self.key.clone(),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl-C, shutting down");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    install_rustls_crypto_provider();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.listener_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = HttpsServer::bind(&config).await?;
        tracing::info!("Listening on https://{}", server.local_addr());
        server.run_until(shutdown_signal()).await
    })?;

    Ok(())
}
