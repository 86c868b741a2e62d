use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Port the listener binds when none is given
pub const DEFAULT_PORT: u16 = 3000;

/// Default server certificate path, relative to the working directory
pub const DEFAULT_CERT_PATH: &str = "server.crt";

/// Default server private key path, relative to the working directory
pub const DEFAULT_KEY_PATH: &str = "server.key";

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address to accept connections on
    pub listen: SocketAddr,
    /// PEM file holding the server certificate (chain)
    pub cert_path: PathBuf,
    /// PEM file holding the server private key
    pub key_path: PathBuf,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_all_interfaces_port_3000() {
        let config = ListenerConfig::default();
        assert_eq!(config.listen.to_string(), "0.0.0.0:3000");
        assert_eq!(config.cert_path, PathBuf::from("server.crt"));
        assert_eq!(config.key_path, PathBuf::from("server.key"));
    }
}
