//! localtls-server
//!
//! A minimal HTTPS listener. It loads the server key and certificate issued
//! by `localtls`, terminates TLS with rustls and answers every request with
//! `200 Hello, World!`.

pub mod config;
pub mod server;
pub mod service;
pub mod tls;

pub use config::ListenerConfig;
pub use server::{HttpsServer, ServerError};
pub use tls::TlsError;
