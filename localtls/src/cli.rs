use std::env::VarError;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};

use crate::commands::{self, Context, trust::TrustCommands};

/// Default environment variable holding the CA key passphrase
const DEFAULT_PASSPHRASE_ENV: &str = "LOCALTLS_CA_PASSPHRASE";

/// localtls - local root CA and localhost server certificates
#[derive(Parser)]
#[command(name = "localtls")]
#[command(version)]
#[command(about = "localtls - local root CA and localhost server certificates")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Directory holding localtls.toml and the generated files
    #[arg(long, global = true, env = "LOCALTLS_DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Environment variable to read the CA key passphrase from
    #[arg(long, global = true, value_name = "VAR", default_value = DEFAULT_PASSPHRASE_ENV)]
    pub passphrase_env: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default localtls.toml
    Init {
        /// Overwrite an existing localtls.toml
        #[arg(long)]
        force: bool,
    },

    /// Generate the root CA key and self-signed certificate
    Ca {
        /// Replace an existing root CA
        #[arg(long)]
        force: bool,
    },

    /// Generate the server key and certificate signing request
    Csr {
        /// Replace an existing server key and request
        #[arg(long)]
        force: bool,
    },

    /// Sign the server request with the root CA
    Sign,

    /// Run every provisioning step (ca, csr, sign)
    Provision {
        /// Regenerate everything, even if files already exist
        #[arg(long)]
        force: bool,
    },

    /// Root CA trust store commands
    #[command(subcommand)]
    Trust(TrustCommands),
}

/// Interpret the passphrase variable. Unset or empty means no passphrase.
fn passphrase_from_env(
    name: &str,
    value: Result<String, VarError>,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    match value {
        Ok(passphrase) => Ok(Some(passphrase).filter(|p| !p.is_empty())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => {
            Err(format!("Environment variable {} is not valid UTF-8", name).into())
        }
    }
}

impl Cli {
    fn context(&self) -> Result<Context, Box<dyn std::error::Error>> {
        let passphrase =
            passphrase_from_env(&self.passphrase_env, std::env::var(&self.passphrase_env))?;
        Ok(Context {
            dir: self.dir.clone(),
            passphrase,
        })
    }

    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let ctx = self.context()?;

        let Some(command) = self.command else {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        };

        match command {
            Commands::Init { force } => commands::init::run(&ctx, force),
            Commands::Ca { force } => commands::provision::run_ca(&ctx, force),
            Commands::Csr { force } => commands::provision::run_csr(&ctx, force),
            Commands::Sign => commands::provision::run_sign(&ctx),
            Commands::Provision { force } => commands::provision::run_all(&ctx, force),
            Commands::Trust(cmd) => commands::trust::run(&ctx, cmd),
        }
    }
}
