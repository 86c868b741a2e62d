use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, Result};

/// Name of the provisioning config file looked up in the working directory
pub const CONFIG_FILENAME: &str = "localtls.toml";

/// Root configuration from localtls.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LocalTlsToml {
    /// [key] section - key generation settings
    pub key: KeySection,

    /// [ca] section - root authority subject and lifetime
    pub ca: CaSection,

    /// [server] section - server certificate subject, SANs and lifetime
    pub server: ServerSection,

    /// [files] section - artifact file names
    pub files: FileNames,
}

/// Signature algorithm used for every generated key pair
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    #[default]
    EcdsaP256,
    EcdsaP384,
    Ed25519,
}

impl KeyAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaP256 => "ecdsa-p256",
            KeyAlgorithm::EcdsaP384 => "ecdsa-p384",
            KeyAlgorithm::Ed25519 => "ed25519",
        }
    }
}

/// [key] section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct KeySection {
    pub algorithm: KeyAlgorithm,
}

/// [ca] section
///
/// The organisation fields are shared with the server certificate subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CaSection {
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
    pub country: String,
    pub state: String,
    pub locality: String,
    pub validity_days: u32,
}

impl Default for CaSection {
    fn default() -> Self {
        Self {
            common_name: "localtls Root CA".to_string(),
            organization: "RandomOrganization".to_string(),
            organizational_unit: "RandomOrganizationUnit".to_string(),
            country: "US".to_string(),
            state: "RandomState".to_string(),
            locality: "RandomCity".to_string(),
            validity_days: 1024,
        }
    }
}

/// [server] section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub validity_days: u32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            common_name: "localhost".to_string(),
            dns_names: vec!["localhost".to_string()],
            ip_addresses: Vec::new(),
            validity_days: 500,
        }
    }
}

impl ServerSection {
    /// Total number of Subject Alternative Name entries
    pub fn san_count(&self) -> usize {
        self.dns_names.len() + self.ip_addresses.len()
    }
}

/// [files] section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileNames {
    pub ca_key: String,
    pub ca_cert: String,
    pub server_key: String,
    pub server_csr: String,
    pub server_cert: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            ca_key: "rootCA.key".to_string(),
            ca_cert: "rootCA.pem".to_string(),
            server_key: "server.key".to_string(),
            server_csr: "server.csr".to_string(),
            server_cert: "server.crt".to_string(),
        }
    }
}

impl FileNames {
    fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("ca_key", &self.ca_key),
            ("ca_cert", &self.ca_cert),
            ("server_key", &self.server_key),
            ("server_csr", &self.server_csr),
            ("server_cert", &self.server_cert),
        ]
    }
}

impl LocalTlsToml {
    /// Load localtls.toml from a directory, falling back to defaults when absent
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILENAME);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        Self::load_from_file(&path)
    }

    /// Load localtls.toml from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    /// Parse localtls.toml content
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: LocalTlsToml = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check if localtls.toml exists in a directory
    pub fn exists_in_dir<P: AsRef<Path>>(dir: P) -> bool {
        dir.as_ref().join(CONFIG_FILENAME).exists()
    }

    /// Write the commented default file into `dir`, returning its path
    pub fn write_template<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILENAME);
        fs::create_dir_all(dir).map_err(|e| ConfigError::FileWrite(dir.to_path_buf(), e))?;
        fs::write(&path, Self::template()).map_err(|e| ConfigError::FileWrite(path.clone(), e))?;
        Ok(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ca.common_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "[ca] common_name cannot be empty".to_string(),
            ));
        }
        if self.ca.validity_days == 0 {
            return Err(ConfigError::Validation(
                "[ca] validity_days must be greater than 0".to_string(),
            ));
        }
        if !self.ca.country.is_empty()
            && !(self.ca.country.len() == 2
                && self.ca.country.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(ConfigError::Validation(format!(
                "[ca] country must be a two-letter code, got '{}'",
                self.ca.country
            )));
        }

        if self.server.common_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "[server] common_name cannot be empty".to_string(),
            ));
        }
        if self.server.validity_days == 0 {
            return Err(ConfigError::Validation(
                "[server] validity_days must be greater than 0".to_string(),
            ));
        }
        if self.server.san_count() == 0 {
            return Err(ConfigError::Validation(
                "[server] must list at least one entry in 'dns_names' or 'ip_addresses'"
                    .to_string(),
            ));
        }
        for name in &self.server.dns_names {
            validate_dns_name(name)?;
        }

        let mut seen = HashSet::new();
        for (field, name) in self.files.entries() {
            validate_file_name(field, name)?;
            if !seen.insert(name) {
                return Err(ConfigError::Validation(format!(
                    "[files] {} reuses file name '{}'",
                    field, name
                )));
            }
        }

        Ok(())
    }

    /// Commented default localtls.toml written by `localtls init`
    pub fn template() -> String {
        let defaults = Self::default();
        format!(
            r#"# localtls provisioning config.
# Every key is optional; removed keys fall back to the values shown here.

[key]
# ecdsa-p256, ecdsa-p384 or ed25519
algorithm = "{algorithm}"

[ca]
common_name = "{ca_cn}"
organization = "{org}"
organizational_unit = "{ou}"
country = "{country}"
state = "{state}"
locality = "{locality}"
validity_days = {ca_days}

[server]
common_name = "{server_cn}"
# Subject Alternative Names. Clients match the connection host against these.
dns_names = ["localhost"]
ip_addresses = []
validity_days = {server_days}

[files]
ca_key = "{ca_key}"
ca_cert = "{ca_cert}"
server_key = "{server_key}"
server_csr = "{server_csr}"
server_cert = "{server_cert}"
"#,
            algorithm = defaults.key.algorithm.as_str(),
            ca_cn = defaults.ca.common_name,
            org = defaults.ca.organization,
            ou = defaults.ca.organizational_unit,
            country = defaults.ca.country,
            state = defaults.ca.state,
            locality = defaults.ca.locality,
            ca_days = defaults.ca.validity_days,
            server_cn = defaults.server.common_name,
            server_days = defaults.server.validity_days,
            ca_key = defaults.files.ca_key,
            ca_cert = defaults.files.ca_cert,
            server_key = defaults.files.server_key,
            server_csr = defaults.files.server_csr,
            server_cert = defaults.files.server_cert,
        )
    }
}

/// Validate a SAN DNS name. A leading `*` label is allowed for wildcards.
pub fn validate_dns_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 253 {
        return Err(ConfigError::Validation(format!(
            "Invalid DNS name '{}': length must be 1-253",
            name
        )));
    }

    for (idx, label) in name.split('.').enumerate() {
        if idx == 0 && label == "*" {
            continue;
        }
        if label.is_empty() || label.len() > 63 {
            return Err(ConfigError::Validation(format!(
                "Invalid DNS name '{}': empty or oversized label",
                name
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ConfigError::Validation(format!(
                "Invalid DNS name '{}': label '{}' cannot start or end with '-'",
                name, label
            )));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-')
        {
            return Err(ConfigError::Validation(format!(
                "Invalid DNS name '{}': unexpected character '{}'",
                name, c
            )));
        }
    }

    Ok(())
}

fn validate_file_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "[files] {} cannot be empty",
            field
        )));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ConfigError::Validation(format!(
            "[files] {} must be a plain file name, got '{}'",
            field, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_file() {
        let config = LocalTlsToml::parse("").unwrap();
        assert_eq!(config, LocalTlsToml::default());
    }

    #[test]
    fn test_defaults_match_walkthrough_layout() {
        let config = LocalTlsToml::default();
        assert_eq!(config.server.dns_names, vec!["localhost".to_string()]);
        assert_eq!(config.files.server_key, "server.key");
        assert_eq!(config.files.server_cert, "server.crt");
        assert_eq!(config.files.ca_cert, "rootCA.pem");
        config.validate().unwrap();
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config = LocalTlsToml::parse(&LocalTlsToml::template()).unwrap();
        assert_eq!(config, LocalTlsToml::default());
    }

    #[test]
    fn test_parse_partial_sections_keep_defaults() {
        let toml = r#"
[server]
dns_names = ["localhost", "app.test"]
ip_addresses = ["127.0.0.1", "::1"]
"#;
        let config = LocalTlsToml::parse(toml).unwrap();
        assert_eq!(config.server.dns_names.len(), 2);
        assert_eq!(config.server.ip_addresses.len(), 2);
        assert_eq!(config.server.common_name, "localhost");
        assert_eq!(config.ca, CaSection::default());
    }

    #[test]
    fn test_parse_key_algorithm() {
        let config = LocalTlsToml::parse("[key]\nalgorithm = \"ed25519\"\n").unwrap();
        assert_eq!(config.key.algorithm, KeyAlgorithm::Ed25519);

        let err = LocalTlsToml::parse("[key]\nalgorithm = \"rsa-1024\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = LocalTlsToml::parse("[server]\ndns = [\"localhost\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_empty_san_list_is_rejected() {
        let err = LocalTlsToml::parse("[server]\ndns_names = []\n").unwrap_err();
        assert!(err.to_string().contains("at least one entry"));
    }

    #[test]
    fn test_ip_only_san_list_is_allowed() {
        let toml = r#"
[server]
dns_names = []
ip_addresses = ["127.0.0.1"]
"#;
        let config = LocalTlsToml::parse(toml).unwrap();
        assert_eq!(config.server.san_count(), 1);
    }

    #[test]
    fn test_zero_validity_is_rejected() {
        let err = LocalTlsToml::parse("[ca]\nvalidity_days = 0\n").unwrap_err();
        assert!(err.to_string().contains("[ca] validity_days"));

        let err = LocalTlsToml::parse("[server]\nvalidity_days = 0\n").unwrap_err();
        assert!(err.to_string().contains("[server] validity_days"));
    }

    #[test]
    fn test_invalid_country_is_rejected() {
        for country in ["USA", "U", "1", "U1", "é"] {
            let content = format!("[ca]\ncountry = \"{}\"\n", country);
            let err = LocalTlsToml::parse(&content).unwrap_err();
            assert!(err.to_string().contains("two-letter"), "{}", country);
        }
    }

    #[test]
    fn test_country_may_be_two_letters_or_empty() {
        for country in ["US", "de", ""] {
            let content = format!("[ca]\ncountry = \"{}\"\n", country);
            let config = LocalTlsToml::parse(&content).unwrap();
            assert_eq!(config.ca.country, country);
        }
    }

    #[test]
    fn test_file_names_must_be_plain_and_distinct() {
        let err = LocalTlsToml::parse("[files]\nserver_key = \"../server.key\"\n").unwrap_err();
        assert!(err.to_string().contains("plain file name"));

        let err = LocalTlsToml::parse("[files]\nserver_cert = \"server.key\"\n").unwrap_err();
        assert!(err.to_string().contains("reuses file name"));
    }

    #[test]
    fn test_validate_dns_name() {
        assert!(validate_dns_name("localhost").is_ok());
        assert!(validate_dns_name("my-app.test").is_ok());
        assert!(validate_dns_name("*.localhost").is_ok());

        assert!(validate_dns_name("").is_err());
        assert!(validate_dns_name("bad host").is_err());
        assert!(validate_dns_name("-lead.test").is_err());
        assert!(validate_dns_name("a..b").is_err());
        assert!(validate_dns_name("app.*.test").is_err());
    }

    #[test]
    fn test_load_from_dir_without_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        assert!(!LocalTlsToml::exists_in_dir(temp.path()));
        let config = LocalTlsToml::load_from_dir(temp.path()).unwrap();
        assert_eq!(config, LocalTlsToml::default());
    }

    #[test]
    fn test_load_from_dir_reads_file() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILENAME),
            "[ca]\ncommon_name = \"Team CA\"\n",
        )
        .unwrap();

        let config = LocalTlsToml::load_from_dir(temp.path()).unwrap();
        assert_eq!(config.ca.common_name, "Team CA");
    }

    #[test]
    fn test_write_template_creates_dir_and_loads() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("certs");

        let path = LocalTlsToml::write_template(&dir).unwrap();
        assert_eq!(path, dir.join(CONFIG_FILENAME));
        assert!(LocalTlsToml::exists_in_dir(&dir));
        assert_eq!(
            LocalTlsToml::load_from_dir(&dir).unwrap(),
            LocalTlsToml::default()
        );
    }

    #[test]
    fn test_write_template_reports_path_on_failure() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let err = LocalTlsToml::write_template(&blocker).unwrap_err();
        assert!(matches!(err, ConfigError::FileWrite(_, _)));
        assert!(err.to_string().contains("not-a-dir"));
    }
}
