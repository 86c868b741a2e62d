use clap::Subcommand;
use localtls::provision::Provisioner;
use localtls::trust::{self, TrustStore, plan_trust};

use super::Context;
use crate::output;

#[derive(Subcommand)]
pub enum TrustCommands {
    /// Show whether the root CA is trusted by this machine
    Status,

    /// Install the root CA in the system trust store (requires sudo)
    Install,

    /// Print manual trust steps for other stores and browsers
    Instructions,
}

fn sudo_trust_explanation_lines() -> [&'static str; 3] {
    [
        "One-time sudo required to trust the localtls root CA.",
        "This enables https://localhost without browser warnings.",
        "localtls only adds the CA certificate to the system trust store.",
    ]
}

pub fn run(ctx: &Context, cmd: TrustCommands) -> Result<(), Box<dyn std::error::Error>> {
    let provisioner = Provisioner::from_dir(&ctx.dir)?;
    let ca_cert_path = provisioner.paths().ca_cert.clone();
    let store = TrustStore::system();

    match cmd {
        TrustCommands::Status => {
            if !ca_cert_path.is_file() {
                output::warning(&format!("No root CA at {}", ca_cert_path.display()));
            } else if store.is_trusted(&ca_cert_path) {
                output::success("Root CA is trusted by this machine.");
            } else {
                output::warning("Root CA is not trusted by this machine.");
                output::muted(&format!(
                    "Run {} to install it.",
                    output::emphasized("localtls trust install")
                ));
            }
        }
        TrustCommands::Install => {
            let plan = plan_trust(ca_cert_path.is_file(), store.is_trusted(&ca_cert_path));
            if !plan.install_trust {
                if ca_cert_path.is_file() {
                    output::success("Root CA is already trusted.");
                    return Ok(());
                }
                return Err(trust::TrustError::MissingCertificate(ca_cert_path).into());
            }

            // No spinner so the sudo password prompt stays visible.
            output::warning("Sudo password required.");
            for line in sudo_trust_explanation_lines() {
                output::muted(line);
            }
            output::step("Installing root CA in system trust store (sudo)...");
            store.install(&ca_cert_path)?;
            output::success("Root CA trusted by system.");
            output::muted("Firefox keeps its own store; see 'localtls trust instructions'.");
        }
        TrustCommands::Instructions => {
            output::section("Trusting the root CA");
            for line in trust::manual_instructions(&ca_cert_path) {
                output::step(&line);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sudo_trust_explanation_mentions_localhost() {
        let lines = sudo_trust_explanation_lines();
        assert!(lines[0].contains("sudo"));
        assert!(lines[1].contains("https://localhost"));
    }
}
