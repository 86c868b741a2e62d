//! localtls
//!
//! Provisions a local root certificate authority and a server certificate
//! for `localhost`:
//!
//! - **config**: `localtls.toml`, the subject fields, SAN list and file names
//! - **ca**: root CA generation, server signing requests and issuance
//! - **keyfile**: passphrase sealing for the CA private key
//! - **provision**: the ordered provisioning steps writing files to disk
//! - **trust**: installing the root CA into the system trust store

pub mod ca;
pub mod config;
pub mod keyfile;
pub mod provision;
pub mod trust;

pub use ca::{CaError, RootCa, ServerRequest};
pub use config::{ConfigError, LocalTlsToml};
pub use provision::{ArtifactPaths, ProvisionError, ProvisionReport, Provisioner, StepOutcome};
pub use trust::{TrustError, TrustStore};
