mod error;
mod localtls_toml;

pub use error::*;
pub use localtls_toml::*;
