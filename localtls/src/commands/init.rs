use localtls::config::{CONFIG_FILENAME, LocalTlsToml};

use super::Context;
use crate::output;

pub fn run(ctx: &Context, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if LocalTlsToml::exists_in_dir(&ctx.dir) && !force {
        return Err(format!(
            "{} already exists. Use --force to overwrite.",
            ctx.dir.join(CONFIG_FILENAME).display()
        )
        .into());
    }

    let path = LocalTlsToml::write_template(&ctx.dir)?;
    tracing::info!(path = %path.display(), "Wrote config template");

    output::success(&format!("Created {}", path.display()));

    output::section("Next Steps");
    output::step("1. Edit the [server] dns_names list if you need hosts besides localhost");
    output::step(&format!(
        "2. Run {} to generate the CA and server certificate",
        output::emphasized("localtls provision")
    ));
    output::step(&format!(
        "3. Run {} to trust the CA on this machine",
        output::emphasized("localtls trust install")
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ctx(temp: &TempDir) -> Context {
        Context {
            dir: temp.path().to_path_buf(),
            passphrase: None,
        }
    }

    #[test]
    fn writes_template_that_loads() {
        let temp = TempDir::new().unwrap();
        run(&ctx(&temp), false).unwrap();

        let loaded = LocalTlsToml::load_from_dir(temp.path()).unwrap();
        assert_eq!(loaded, LocalTlsToml::default());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILENAME), "[ca]\n").unwrap();

        let err = run(&ctx(&temp), false).unwrap_err();
        assert!(err.to_string().contains("--force"));

        run(&ctx(&temp), true).unwrap();
        let content = fs::read_to_string(temp.path().join(CONFIG_FILENAME)).unwrap();
        assert!(content.contains("[server]"));
    }

    #[test]
    fn write_failure_names_the_path() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("occupied");
        fs::write(&blocker, "").unwrap();
        let ctx = Context {
            dir: blocker,
            passphrase: None,
        };

        let err = run(&ctx, false).unwrap_err();
        assert!(err.to_string().starts_with("Failed to write file"), "{}", err);
        assert!(err.to_string().contains("occupied"));
    }
}
