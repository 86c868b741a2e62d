use localtls::provision::{ArtifactPaths, Provisioner, StepOutcome};

use super::Context;
use crate::output;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn provisioner(ctx: &Context) -> Result<Provisioner, Box<dyn std::error::Error>> {
    let provisioner = Provisioner::from_dir(&ctx.dir)?.with_passphrase(ctx.passphrase.clone());
    if output::is_verbose() {
        let config = provisioner.config();
        output::muted(&format!(
            "Key algorithm: {}, SANs: {}",
            config.key.algorithm.as_str(),
            san_summary(config)
        ));
    }
    Ok(provisioner)
}

fn san_summary(config: &localtls::LocalTlsToml) -> String {
    config
        .server
        .dns_names
        .iter()
        .cloned()
        .chain(config.server.ip_addresses.iter().map(|ip| ip.to_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn report(outcome: StepOutcome, created: &str, reused: &str) {
    match outcome {
        StepOutcome::Created => output::success(created),
        StepOutcome::Reused => output::muted(reused),
    }
}

pub fn run_ca(ctx: &Context, force: bool) -> CommandResult {
    let p = provisioner(ctx)?;
    let (_, outcome) = p.create_ca(force)?;
    let path = p.paths().ca_cert.display();
    report(
        outcome,
        &format!("Root CA written to {}", path),
        &format!("Root CA already exists at {} (use --force to replace)", path),
    );
    if outcome == StepOutcome::Created && ctx.passphrase.is_none() {
        output::warning(
            "CA private key is stored unencrypted. Set the --passphrase-env variable to seal it.",
        );
    }
    Ok(())
}

pub fn run_csr(ctx: &Context, force: bool) -> CommandResult {
    let p = provisioner(ctx)?;
    let outcome = p.create_request(force)?;
    let path = p.paths().server_csr.display();
    report(
        outcome,
        &format!("Server key and signing request written to {}", path),
        &format!("Signing request already exists at {} (use --force to replace)", path),
    );
    Ok(())
}

pub fn run_sign(ctx: &Context) -> CommandResult {
    let p = provisioner(ctx)?;
    p.sign_request()?;
    output::success(&format!(
        "Server certificate written to {}",
        p.paths().server_cert.display()
    ));
    Ok(())
}

pub fn run_all(ctx: &Context, force: bool) -> CommandResult {
    let p = provisioner(ctx)?;
    let result = p.run_all(force)?;

    output::section("Provisioned");
    report(result.ca, "Generated root CA", "Reused existing root CA");
    report(
        result.request,
        "Generated server key and signing request",
        "Reused existing server key and signing request",
    );
    output::success("Signed server certificate");

    print_next_steps(&result.paths);
    Ok(())
}

fn print_next_steps(paths: &ArtifactPaths) {
    output::section("Next Steps");
    output::step(&format!(
        "1. Trust the CA: {}",
        output::emphasized("localtls trust install")
    ));
    output::step(&format!(
        "2. Start the listener: {}",
        output::emphasized(&format!(
            "localtls-server --cert {} --key {}",
            paths.server_cert.display(),
            paths.server_key.display()
        ))
    ));
    output::step("3. Open https://localhost:3000");
}
