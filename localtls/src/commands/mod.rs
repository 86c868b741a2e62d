pub mod init;
pub mod provision;
pub mod trust;

use std::path::PathBuf;

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory holding localtls.toml and the generated files
    pub dir: PathBuf,
    /// CA key passphrase, if one was provided
    pub passphrase: Option<String>,
}
