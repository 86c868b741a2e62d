//! Certificate provisioning procedure
//!
//! Produces, in order:
//! 1. the root CA key and self-signed certificate
//! 2. the server key and a certificate signing request with a SAN extension
//! 3. the server certificate, signed by the root CA
//!
//! The listener only consumes the server key and certificate.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ca::{CaError, RootCa, ServerRequest};
use crate::config::{ConfigError, FileNames, LocalTlsToml};
use crate::keyfile::{self, KeyFileError};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ca(#[from] CaError),

    #[error(transparent)]
    KeyFile(#[from] KeyFileError),

    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write file {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),

    #[error("Missing {0}; run the earlier provisioning steps first")]
    MissingArtifact(PathBuf),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Locations of every provisioning artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub ca_key: PathBuf,
    pub ca_cert: PathBuf,
    pub server_key: PathBuf,
    pub server_csr: PathBuf,
    pub server_cert: PathBuf,
}

impl ArtifactPaths {
    pub fn resolve(dir: &Path, files: &FileNames) -> Self {
        Self {
            ca_key: dir.join(&files.ca_key),
            ca_cert: dir.join(&files.ca_cert),
            server_key: dir.join(&files.server_key),
            server_csr: dir.join(&files.server_csr),
            server_cert: dir.join(&files.server_cert),
        }
    }

    pub fn ca_exists(&self) -> bool {
        self.ca_key.is_file() && self.ca_cert.is_file()
    }

    pub fn request_exists(&self) -> bool {
        self.server_key.is_file() && self.server_csr.is_file()
    }
}

/// Whether a step produced new material or kept what was on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Created,
    Reused,
}

/// Outcome of a full provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub ca: StepOutcome,
    pub request: StepOutcome,
    pub paths: ArtifactPaths,
}

pub struct Provisioner {
    config: LocalTlsToml,
    paths: ArtifactPaths,
    passphrase: Option<String>,
}

impl Provisioner {
    /// Create a provisioner writing into `dir`
    pub fn new(dir: impl AsRef<Path>, config: LocalTlsToml) -> Self {
        let paths = ArtifactPaths::resolve(dir.as_ref(), &config.files);
        Self {
            config,
            paths,
            passphrase: None,
        }
    }

    /// Load `localtls.toml` from `dir` (or defaults) and provision into `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config = LocalTlsToml::load_from_dir(dir.as_ref())?;
        Ok(Self::new(dir, config))
    }

    /// Seal the CA key with `passphrase` when writing, and use it when reading
    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase.filter(|p| !p.is_empty());
        self
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn config(&self) -> &LocalTlsToml {
        &self.config
    }

    /// Generate the root CA, or load the existing one unless `force` is set
    pub fn create_ca(&self, force: bool) -> Result<(RootCa, StepOutcome)> {
        if self.paths.ca_exists() && !force {
            let ca = self.load_ca()?;
            tracing::info!(cert_path = %self.paths.ca_cert.display(), "Reusing existing root CA");
            return Ok((ca, StepOutcome::Reused));
        }

        let ca = RootCa::generate(&self.config.ca, self.config.key.algorithm)?;
        ensure_parent(&self.paths.ca_cert)?;

        let key_contents = match self.passphrase.as_deref() {
            Some(passphrase) => keyfile::seal(ca.key_pem(), passphrase)?,
            None => ca.key_pem().to_string(),
        };
        keyfile::write_private(&self.paths.ca_key, &key_contents)?;
        write_file(&self.paths.ca_cert, ca.cert_pem())?;

        tracing::info!(
            cert_path = %self.paths.ca_cert.display(),
            key_path = %self.paths.ca_key.display(),
            sealed = self.passphrase.is_some(),
            "Generated root CA"
        );

        Ok((ca, StepOutcome::Created))
    }

    /// Load the root CA from disk
    pub fn load_ca(&self) -> Result<RootCa> {
        require(&self.paths.ca_cert)?;
        require(&self.paths.ca_key)?;

        let cert_pem = read_file(&self.paths.ca_cert)?;
        let key_pem = keyfile::read_private(&self.paths.ca_key, self.passphrase.as_deref())?;
        Ok(RootCa::from_pem(cert_pem, key_pem)?)
    }

    /// Generate the server key and CSR, or keep the existing pair unless `force` is set
    pub fn create_request(&self, force: bool) -> Result<StepOutcome> {
        if self.paths.request_exists() && !force {
            tracing::info!(csr_path = %self.paths.server_csr.display(), "Reusing existing signing request");
            return Ok(StepOutcome::Reused);
        }

        let request = ServerRequest::generate(&self.config)?;
        ensure_parent(&self.paths.server_csr)?;
        keyfile::write_private(&self.paths.server_key, &request.key_pem)?;
        write_file(&self.paths.server_csr, &request.csr_pem)?;

        tracing::info!(
            csr_path = %self.paths.server_csr.display(),
            key_path = %self.paths.server_key.display(),
            dns_names = ?self.config.server.dns_names,
            ip_addresses = ?self.config.server.ip_addresses,
            "Generated server key and signing request"
        );

        Ok(StepOutcome::Created)
    }

    /// Sign the server CSR with the root CA and write the server certificate
    pub fn sign_request(&self) -> Result<()> {
        let ca = self.load_ca()?;
        self.sign_with(&ca)
    }

    fn sign_with(&self, ca: &RootCa) -> Result<()> {
        require(&self.paths.server_csr)?;
        let csr_pem = read_file(&self.paths.server_csr)?;

        let cert_pem = ca.sign_request(&csr_pem, &self.config.server)?;
        write_file(&self.paths.server_cert, &cert_pem)?;

        tracing::info!(
            cert_path = %self.paths.server_cert.display(),
            validity_days = self.config.server.validity_days,
            "Signed server certificate"
        );
        Ok(())
    }

    /// Run every step in order
    ///
    /// Existing CA and server key material is reused unless `force` is set.
    /// The server certificate is always re-signed, so it matches the current
    /// CA and server key even after a single step was forced on its own.
    pub fn run_all(&self, force: bool) -> Result<ProvisionReport> {
        let (ca, ca_outcome) = self.create_ca(force)?;
        let request_outcome = self.create_request(force)?;
        self.sign_with(&ca)?;

        Ok(ProvisionReport {
            ca: ca_outcome,
            request: request_outcome,
            paths: self.paths.clone(),
        })
    }
}

fn require(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProvisionError::MissingArtifact(path.to_path_buf()))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| ProvisionError::FileWrite(parent.to_path_buf(), e))?;
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ProvisionError::FileRead(path.to_path_buf(), e))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| ProvisionError::FileWrite(path.to_path_buf(), e))
}
