//! System trust store installation for the root CA
//!
//! Browsers only accept the server certificate once the root CA is trusted.
//! macOS and Debian-style Linux stores are handled automatically (sudo
//! required). Everything else gets printed instructions.

use std::ffi::OsStr;
#[cfg(not(target_os = "macos"))]
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// File name used for the CA copy in the Linux system CA directory
const LINUX_CA_FILENAME: &str = "localtls-rootCA.crt";

/// Debian/Ubuntu directory scanned by `update-ca-certificates`
const LINUX_CA_DIR: &str = "/usr/local/share/ca-certificates";

#[cfg(target_os = "macos")]
const MACOS_SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("CA certificate not found at {0}. Run 'localtls ca' first.")]
    MissingCertificate(PathBuf),

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Command(String),
}

pub type Result<T> = std::result::Result<T, TrustError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPlan {
    pub install_trust: bool,
}

/// Decide whether the CA needs to be installed
pub fn plan_trust(ca_exists: bool, ca_trusted: bool) -> TrustPlan {
    TrustPlan {
        install_trust: ca_exists && !ca_trusted,
    }
}

/// Host trust store
#[derive(Debug, Clone)]
pub struct TrustStore {
    /// Directory holding the installed CA copy (Linux)
    #[cfg_attr(target_os = "macos", allow(dead_code))]
    linux_ca_dir: PathBuf,
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::system()
    }
}

impl TrustStore {
    /// The trust store of the running host
    pub fn system() -> Self {
        Self {
            linux_ca_dir: PathBuf::from(LINUX_CA_DIR),
        }
    }

    /// Trust store rooted at a custom CA directory
    pub fn with_linux_ca_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            linux_ca_dir: dir.into(),
        }
    }

    #[cfg_attr(target_os = "macos", allow(dead_code))]
    fn installed_copy_path(&self) -> PathBuf {
        self.linux_ca_dir.join(LINUX_CA_FILENAME)
    }

    /// Check if the CA is trusted by the system
    #[cfg(target_os = "macos")]
    pub fn is_trusted(&self, ca_cert_path: &Path) -> bool {
        if !ca_cert_path.is_file() {
            return false;
        }

        Command::new("security")
            .args(["verify-cert", "-c"])
            .arg(ca_cert_path)
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Check if the CA is trusted by the system
    ///
    /// The installed copy must exist and match the CA on disk byte for byte.
    #[cfg(not(target_os = "macos"))]
    pub fn is_trusted(&self, ca_cert_path: &Path) -> bool {
        let Ok(local) = fs::read(ca_cert_path) else {
            return false;
        };
        fs::read(self.installed_copy_path())
            .map(|installed| installed == local)
            .unwrap_or(false)
    }

    /// Install the CA in the system trust store (requires sudo)
    #[cfg(target_os = "macos")]
    pub fn install(&self, ca_cert_path: &Path) -> Result<()> {
        if !ca_cert_path.is_file() {
            return Err(TrustError::MissingCertificate(ca_cert_path.to_path_buf()));
        }

        run_sudo(&[
            OsStr::new("security"),
            OsStr::new("add-trusted-cert"),
            OsStr::new("-d"),
            OsStr::new("-r"),
            OsStr::new("trustRoot"),
            OsStr::new("-k"),
            OsStr::new(MACOS_SYSTEM_KEYCHAIN),
            ca_cert_path.as_os_str(),
        ])?;

        tracing::info!(cert_path = %ca_cert_path.display(), "Installed CA in System keychain");
        Ok(())
    }

    /// Install the CA in the system trust store (requires sudo)
    #[cfg(not(target_os = "macos"))]
    pub fn install(&self, ca_cert_path: &Path) -> Result<()> {
        if !ca_cert_path.is_file() {
            return Err(TrustError::MissingCertificate(ca_cert_path.to_path_buf()));
        }

        let dest = self.installed_copy_path();
        run_sudo(&[OsStr::new("cp"), ca_cert_path.as_os_str(), dest.as_os_str()])?;
        run_sudo(&[OsStr::new("update-ca-certificates")])?;

        tracing::info!(
            cert_path = %ca_cert_path.display(),
            dest = %dest.display(),
            "Installed CA in system CA directory"
        );
        Ok(())
    }
}

fn run_sudo(args: &[&OsStr]) -> Result<()> {
    let command = args
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    tracing::debug!(command = %command, "Running sudo");
    let status = Command::new("sudo")
        .args(args)
        .status()
        .map_err(|source| TrustError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !status.success() {
        return Err(TrustError::Command(format!(
            "'sudo {}' exited with {}",
            command, status
        )));
    }
    Ok(())
}

/// Steps for trust stores that are not handled automatically
pub fn manual_instructions(ca_cert_path: &Path) -> Vec<String> {
    let cert = ca_cert_path.display();
    vec![
        format!(
            "macOS: open Keychain Access, import {} into the System keychain, then set 'When using this certificate' to 'Always Trust'.",
            cert
        ),
        format!(
            "Debian/Ubuntu: sudo cp {} {}/{} && sudo update-ca-certificates",
            cert, LINUX_CA_DIR, LINUX_CA_FILENAME
        ),
        format!(
            "Fedora/RHEL: sudo cp {} /etc/pki/ca-trust/source/anchors/ && sudo update-ca-trust",
            cert
        ),
        format!("Windows: certutil -addstore -f ROOT {}", cert),
        format!(
            "Firefox: Settings > Privacy & Security > Certificates > View Certificates > Authorities > Import {}, then tick 'Trust this CA to identify websites'.",
            cert
        ),
        format!(
            "Chrome/Chromium on Linux: certutil -d sql:$HOME/.pki/nssdb -A -t \"C,,\" -n localtls -i {}",
            cert
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn plan_trusted_ca_does_nothing() {
        assert_eq!(
            plan_trust(true, true),
            TrustPlan {
                install_trust: false
            }
        );
    }

    #[test]
    fn plan_untrusted_ca_installs() {
        assert_eq!(
            plan_trust(true, false),
            TrustPlan {
                install_trust: true
            }
        );
    }

    #[test]
    fn plan_missing_ca_cannot_install() {
        assert_eq!(
            plan_trust(false, false),
            TrustPlan {
                install_trust: false
            }
        );
    }

    #[test]
    fn install_without_ca_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = TrustStore::with_linux_ca_dir(temp.path());
        let err = store
            .install(&temp.path().join("rootCA.pem"))
            .unwrap_err();
        assert!(matches!(err, TrustError::MissingCertificate(_)));
    }

    #[test]
    fn missing_ca_is_not_trusted() {
        let temp = TempDir::new().unwrap();
        let store = TrustStore::with_linux_ca_dir(temp.path());
        assert!(!store.is_trusted(&temp.path().join("rootCA.pem")));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn linux_trust_requires_matching_installed_copy() {
        let temp = TempDir::new().unwrap();
        let system_dir = temp.path().join("system");
        fs::create_dir_all(&system_dir).unwrap();
        let store = TrustStore::with_linux_ca_dir(&system_dir);

        let ca_path = temp.path().join("rootCA.pem");
        fs::write(&ca_path, "ca-one").unwrap();
        assert!(!store.is_trusted(&ca_path));

        fs::write(system_dir.join(LINUX_CA_FILENAME), "ca-two").unwrap();
        assert!(!store.is_trusted(&ca_path));

        fs::write(system_dir.join(LINUX_CA_FILENAME), "ca-one").unwrap();
        assert!(store.is_trusted(&ca_path));
    }

    #[test]
    fn manual_instructions_reference_the_ca_file() {
        let lines = manual_instructions(Path::new("/tmp/rootCA.pem"));
        assert!(lines.iter().all(|line| line.contains("/tmp/rootCA.pem")));
        assert!(lines.iter().any(|line| line.starts_with("Firefox")));
    }
}
