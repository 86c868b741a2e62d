//! Private key files
//!
//! The root CA key may be sealed with a passphrase. A sealed key is a PEM
//! block tagged [`SEALED_TAG`] whose payload is `salt || nonce || ciphertext`:
//! the key is derived from the passphrase with Argon2id and the PEM-encoded
//! private key is encrypted with AES-256-GCM.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use argon2::Argon2;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// PEM tag of a sealed private key
pub const SEALED_TAG: &str = "LOCALTLS ENCRYPTED PRIVATE KEY";

/// AES-256 key size in bytes
const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes
const NONCE_SIZE: usize = 12;

/// Argon2 salt size in bytes
const SALT_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write file {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),

    #[error("Private key is encrypted; a passphrase is required")]
    PassphraseRequired,

    #[error("Passphrase cannot be empty")]
    EmptyPassphrase,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}

pub type Result<T> = std::result::Result<T, KeyFileError>;

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let mut key = [0u8; KEY_SIZE];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| KeyFileError::Encryption(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

/// Encrypt a PEM private key with a passphrase
pub fn seal(key_pem: &str, passphrase: &str) -> Result<String> {
    if passphrase.is_empty() {
        return Err(KeyFileError::EmptyPassphrase);
    }

    let mut salt = [0u8; SALT_SIZE];
    getrandom::fill(&mut salt)
        .map_err(|e| KeyFileError::Encryption(format!("Failed to generate salt: {}", e)))?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    getrandom::fill(&mut nonce_bytes)
        .map_err(|e| KeyFileError::Encryption(format!("Failed to generate nonce: {}", e)))?;

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeyFileError::Encryption(format!("Failed to create cipher: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), key_pem.as_bytes())
        .map_err(|e| KeyFileError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut payload = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);

    Ok(pem::encode(&pem::Pem::new(SEALED_TAG, payload)))
}

/// Check whether file contents hold a sealed key
pub fn is_sealed(contents: &str) -> bool {
    contents.contains(&format!("-----BEGIN {}-----", SEALED_TAG))
}

/// Return the PEM private key held in `contents`, decrypting it if sealed
pub fn open(contents: &str, passphrase: Option<&str>) -> Result<String> {
    if !is_sealed(contents) {
        return Ok(contents.to_string());
    }

    let passphrase = passphrase
        .filter(|p| !p.is_empty())
        .ok_or(KeyFileError::PassphraseRequired)?;

    let block = pem::parse(contents)
        .map_err(|e| KeyFileError::Decryption(format!("Invalid PEM: {}", e)))?;
    let payload = block.contents();
    if payload.len() < SALT_SIZE + NONCE_SIZE {
        return Err(KeyFileError::Decryption("Ciphertext too short".to_string()));
    }

    let (salt, rest) = payload.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| KeyFileError::Decryption(format!("Failed to create cipher: {}", e)))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            KeyFileError::Decryption("Decryption failed (wrong passphrase or corrupted key)".to_string())
        })?;

    String::from_utf8(plaintext)
        .map_err(|e| KeyFileError::Decryption(format!("Invalid UTF-8: {}", e)))
}

/// Read a private key file, decrypting it if sealed
pub fn read_private(path: &Path, passphrase: Option<&str>) -> Result<String> {
    let contents =
        fs::read_to_string(path).map_err(|e| KeyFileError::FileRead(path.to_path_buf(), e))?;
    open(&contents, passphrase)
}

/// Write private key material readable by the owner only
pub fn write_private(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| KeyFileError::FileWrite(path.to_path_buf(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, permissions)
            .map_err(|e| KeyFileError::FileWrite(path.to_path_buf(), e))?;
    }

    Ok(())
}
