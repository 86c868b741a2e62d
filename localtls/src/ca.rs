//! Local Certificate Authority
//!
//! Generates the root authority, the server certificate signing request and
//! issues the server certificate from that request.
//!
//! Every call to a `generate` function creates a fresh random key pair, so two
//! provisioning runs never produce the same artifacts.

use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
    SerialNumber, SignatureAlgorithm,
};
use rcgen::string::Ia5String;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::config::{CaSection, KeyAlgorithm, LocalTlsToml, ServerSection};

/// Serial numbers are 16 random bytes, first byte forced into 0x40..=0x7f so the
/// DER integer stays positive and minimally encoded
const SERIAL_LEN: usize = 16;

/// Backdating applied to `not_before` to absorb clock skew between machines
const CLOCK_SKEW_DAYS: i64 = 1;

/// Errors that can occur during CA operations
#[derive(Debug, Error)]
pub enum CaError {
    #[error("Failed to generate keypair: {0}")]
    KeypairGeneration(String),

    #[error("Failed to generate certificate: {0}")]
    CertificateGeneration(String),

    #[error("Failed to parse certificate/key: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CaError>;

/// Root certificate authority
#[derive(Clone)]
pub struct RootCa {
    /// Root CA certificate (PEM)
    cert_pem: String,
    /// Root CA private key (PEM)
    key_pem: String,
}

impl RootCa {
    /// Generate a new self-signed root authority
    pub fn generate(ca: &CaSection, algorithm: KeyAlgorithm) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject_dn(ca, &ca.common_name);

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(random_serial()?);

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(CLOCK_SKEW_DAYS);
        params.not_after = now + Duration::days(i64::from(ca.validity_days));

        let key_pair = generate_key_pair(algorithm)?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::CertificateGeneration(e.to_string()))?;

        tracing::debug!(
            common_name = %ca.common_name,
            algorithm = algorithm.as_str(),
            validity_days = ca.validity_days,
            "Generated root CA"
        );

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }

    /// Load an existing authority, rejecting malformed PEM input
    pub fn from_pem(cert_pem: String, key_pem: String) -> Result<Self> {
        let ca = Self { cert_pem, key_pem };
        ca.issuer()?;
        Ok(ca)
    }

    /// Get the CA certificate PEM
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Get the CA private key PEM
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    fn issuer(&self) -> Result<Issuer<'static, KeyPair>> {
        let key = KeyPair::from_pem(&self.key_pem)
            .map_err(|e| CaError::Parse(format!("Failed to parse CA private key: {}", e)))?;
        Issuer::from_ca_cert_pem(&self.cert_pem, key)
            .map_err(|e| CaError::Parse(format!("Failed to parse CA certificate: {}", e)))
    }

    /// Issue a server certificate for a PEM-encoded signing request
    ///
    /// SANs present in the request are kept. A request without SANs gets the
    /// configured `[server]` names.
    pub fn sign_request(&self, csr_pem: &str, server: &ServerSection) -> Result<String> {
        let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| CaError::Parse(format!("Failed to parse signing request: {}", e)))?;

        let params = &mut csr.params;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;
        params.serial_number = Some(random_serial()?);

        if params.subject_alt_names.is_empty() {
            params.subject_alt_names = san_entries(server)?;
        }

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(CLOCK_SKEW_DAYS);
        params.not_after = now + Duration::days(i64::from(server.validity_days));

        let issuer = self.issuer()?;
        let cert = csr.signed_by(&issuer).map_err(|e| {
            CaError::CertificateGeneration(format!("Failed to sign server certificate: {}", e))
        })?;

        Ok(cert.pem())
    }
}

/// A server key pair together with its certificate signing request
#[derive(Clone)]
pub struct ServerRequest {
    /// PEM-encoded certificate signing request
    pub csr_pem: String,
    /// PEM-encoded private key
    pub key_pem: String,
}

impl ServerRequest {
    /// Generate a server key and a CSR carrying the configured SAN extension
    pub fn generate(config: &LocalTlsToml) -> Result<Self> {
        let server = &config.server;
        if server.san_count() == 0 {
            return Err(CaError::Validation(
                "At least one subject alternative name is required".to_string(),
            ));
        }

        let mut params = CertificateParams::default();
        params.distinguished_name = subject_dn(&config.ca, &server.common_name);
        params.subject_alt_names = san_entries(server)?;

        let key_pair = generate_key_pair(config.key.algorithm)?;
        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| CaError::CertificateGeneration(e.to_string()))?;
        let csr_pem = csr
            .pem()
            .map_err(|e| CaError::CertificateGeneration(e.to_string()))?;

        tracing::debug!(
            common_name = %server.common_name,
            sans = server.san_count(),
            "Generated server signing request"
        );

        Ok(Self {
            csr_pem,
            key_pem: key_pair.serialize_pem(),
        })
    }
}

fn signature_algorithm(algorithm: KeyAlgorithm) -> &'static SignatureAlgorithm {
    match algorithm {
        KeyAlgorithm::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
        KeyAlgorithm::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        KeyAlgorithm::Ed25519 => &rcgen::PKCS_ED25519,
    }
}

fn generate_key_pair(algorithm: KeyAlgorithm) -> Result<KeyPair> {
    KeyPair::generate_for(signature_algorithm(algorithm))
        .map_err(|e| CaError::KeypairGeneration(e.to_string()))
}

fn random_serial() -> Result<SerialNumber> {
    let mut bytes = [0u8; SERIAL_LEN];
    getrandom::fill(&mut bytes)
        .map_err(|e| CaError::CertificateGeneration(format!("Failed to generate serial: {}", e)))?;
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    Ok(SerialNumber::from_slice(&bytes))
}

/// Subject shared by the CA and the server: organisation fields from `[ca]`
fn subject_dn(ca: &CaSection, common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    for (ty, value) in [
        (DnType::CountryName, &ca.country),
        (DnType::StateOrProvinceName, &ca.state),
        (DnType::LocalityName, &ca.locality),
        (DnType::OrganizationName, &ca.organization),
        (DnType::OrganizationalUnitName, &ca.organizational_unit),
    ] {
        if !value.trim().is_empty() {
            dn.push(ty, value.as_str());
        }
    }
    dn.push(DnType::CommonName, common_name);
    dn
}

fn san_entries(server: &ServerSection) -> Result<Vec<SanType>> {
    let mut sans = Vec::with_capacity(server.san_count());
    for name in &server.dns_names {
        let dns: Ia5String = name.as_str().try_into().map_err(|e| {
            CaError::Validation(format!("Invalid DNS name '{}': {}", name, e))
        })?;
        sans.push(SanType::DnsName(dns));
    }
    sans.extend(server.ip_addresses.iter().copied().map(SanType::IpAddress));
    Ok(sans)
}
