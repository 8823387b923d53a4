//! Local certificate authority
//!
//! The CA key pair lives on disk under `<state_dir>/.ssl/` and is created
//! once. It is loaded into the cluster as a TLS secret backing a cert-manager
//! `ClusterIssuer`, mounted into every kind node, and can optionally be
//! trusted by the host so ingress certificates validate in the browser.

use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, KeyPair,
    KeyUsagePurpose,
};
use thiserror::Error;
use tracing::{info, warn};
use x509_parser::prelude::*;

/// Default validity period for the CA certificate (10 years)
pub const CA_VALIDITY_YEARS: i64 = 10;

/// Organization written into the CA subject
pub const CA_ORGANIZATION: &str = "kindling";

/// Directory under the state dir holding PEM files
pub const SSL_DIR: &str = ".ssl";

fn compute_validity(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    let not_after = now + ::time::Duration::days(years * 365);
    (now, not_after)
}

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),

    /// Only one of the two CA files exists
    #[error("incomplete CA at {dir}: {missing} is missing")]
    Incomplete {
        /// Directory holding the CA files
        dir: String,
        /// The missing file
        missing: String,
    },
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Validity and subject of a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// Whether basicConstraints marks it as a CA
    pub is_ca: bool,
}

impl CertificateInfo {
    /// Parse certificate info from PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            is_ca: cert.is_ca(),
        })
    }

    /// Seconds remaining until the certificate expires
    pub fn remaining_secs(&self) -> i64 {
        self.not_after - ::time::OffsetDateTime::now_utc().unix_timestamp()
    }

    /// Check if certificate has expired
    pub fn is_expired(&self) -> bool {
        self.remaining_secs() <= 0
    }
}

/// Locations of the CA key pair on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaFiles {
    /// PEM certificate (`ca.crt`)
    pub cert: PathBuf,
    /// PEM private key (`ca.key`)
    pub key: PathBuf,
}

impl CaFiles {
    /// `<state_dir>/.ssl/ca.crt` and `<state_dir>/.ssl/ca.key`
    pub fn in_state_dir(state_dir: &Path) -> Self {
        let dir = state_dir.join(SSL_DIR);
        Self {
            cert: dir.join("ca.crt"),
            key: dir.join("ca.key"),
        }
    }

    fn dir(&self) -> &Path {
        self.cert.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Self-signed certificate authority
#[derive(Clone)]
pub struct CertificateAuthority {
    ca_key_pem: String,
    ca_cert_pem: String,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("ca_cert_pem", &self.ca_cert_pem)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Create a new self-signed CA
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(CA_ORGANIZATION.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let (not_before, not_after) = compute_validity(CA_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate CA key: {}", e))
        })?;

        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            ca_key_pem: key_pair.serialize_pem(),
            ca_cert_pem: cert.pem(),
        })
    }

    /// Load CA from PEM strings, validating both parse
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA key: {}", e)))?;
        let info = CertificateInfo::from_pem(cert_pem)?;
        if !info.is_ca {
            return Err(PkiError::ParseError(format!(
                "certificate '{}' is not a CA",
                info.common_name
            )));
        }

        Ok(Self {
            ca_key_pem: key_pem.to_string(),
            ca_cert_pem: cert_pem.to_string(),
        })
    }

    /// Load CA from disk
    pub fn load(files: &CaFiles) -> Result<Self> {
        let cert = std::fs::read_to_string(&files.cert)?;
        let key = std::fs::read_to_string(&files.key)?;
        Self::from_pem(&cert, &key)
    }

    /// Write the CA to disk, creating the directory. The key is written
    /// owner-readable only.
    pub fn save(&self, files: &CaFiles) -> Result<()> {
        std::fs::create_dir_all(files.dir())?;
        std::fs::write(&files.cert, &self.ca_cert_pem)?;
        write_private(&files.key, &self.ca_key_pem)?;
        Ok(())
    }

    /// Load the CA if both files exist, otherwise generate and persist one.
    ///
    /// Returns the CA and whether it was freshly generated. A half-present
    /// CA (one file missing) is an error rather than silently replaced.
    pub fn load_or_generate(files: &CaFiles, common_name: &str) -> Result<(Self, bool)> {
        match (files.cert.is_file(), files.key.is_file()) {
            (true, true) => {
                let ca = Self::load(files)?;
                let info = ca.cert_info()?;
                if info.is_expired() {
                    warn!(cert = %files.cert.display(), "local CA has expired; delete it to regenerate");
                }
                info!(cert = %files.cert.display(), "Using existing local CA");
                Ok((ca, false))
            }
            (false, false) => {
                info!(cert = %files.cert.display(), "Generating local CA");
                let ca = Self::new(common_name)?;
                ca.save(files)?;
                Ok((ca, true))
            }
            (cert, _) => Err(PkiError::Incomplete {
                dir: files.dir().display().to_string(),
                missing: if cert { "ca.key" } else { "ca.crt" }.to_string(),
            }),
        }
    }

    /// The CA certificate in PEM format
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// The CA private key in PEM format
    pub fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    /// Certificate info (validity period, subject)
    pub fn cert_info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_pem(&self.ca_cert_pem)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ca_can_be_created() {
        let ca = CertificateAuthority::new("kindling dev CA").unwrap();
        assert!(ca.ca_cert_pem().contains("BEGIN CERTIFICATE"));
        assert!(ca.ca_key_pem().contains("PRIVATE KEY"));

        let info = ca.cert_info().unwrap();
        assert!(info.is_ca);
        assert_eq!(info.common_name, "kindling dev CA");
        assert!(!info.is_expired());
    }

    #[test]
    fn ca_validity_is_ten_years() {
        let info = CertificateAuthority::new("ca").unwrap().cert_info().unwrap();
        let days = (info.not_after - info.not_before) / 86_400;
        assert_eq!(days, CA_VALIDITY_YEARS * 365);
    }

    #[test]
    fn ca_files_live_under_ssl_dir() {
        let files = CaFiles::in_state_dir(Path::new("/work"));
        assert_eq!(files.cert, PathBuf::from("/work/.ssl/ca.crt"));
        assert_eq!(files.key, PathBuf::from("/work/.ssl/ca.key"));
    }

    #[test]
    fn ca_can_be_saved_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let files = CaFiles::in_state_dir(dir.path());

        let ca = CertificateAuthority::new("ca").unwrap();
        ca.save(&files).unwrap();
        assert!(files.cert.is_file() && files.key.is_file());

        let loaded = CertificateAuthority::load(&files).unwrap();
        assert_eq!(loaded.ca_cert_pem(), ca.ca_cert_pem());
        assert_eq!(loaded.ca_key_pem(), ca.ca_key_pem());
    }

    #[cfg(unix)]
    #[test]
    fn private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let files = CaFiles::in_state_dir(dir.path());
        CertificateAuthority::new("ca").unwrap().save(&files).unwrap();

        let mode = std::fs::metadata(&files.key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn existing_ca_is_not_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let files = CaFiles::in_state_dir(dir.path());

        let (first, generated) = CertificateAuthority::load_or_generate(&files, "ca").unwrap();
        assert!(generated);
        let (second, generated) = CertificateAuthority::load_or_generate(&files, "ca").unwrap();
        assert!(!generated);
        assert_eq!(first.ca_cert_pem(), second.ca_cert_pem());
    }

    #[test]
    fn half_present_ca_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = CaFiles::in_state_dir(dir.path());
        CertificateAuthority::new("ca").unwrap().save(&files).unwrap();
        std::fs::remove_file(&files.key).unwrap();

        let err = CertificateAuthority::load_or_generate(&files, "ca").unwrap_err();
        match err {
            PkiError::Incomplete { missing, .. } => assert_eq!(missing, "ca.key"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn corrupted_ca_is_rejected() {
        let ca = CertificateAuthority::new("ca").unwrap();
        assert!(CertificateAuthority::from_pem("not a cert", ca.ca_key_pem()).is_err());
        assert!(CertificateAuthority::from_pem(ca.ca_cert_pem(), "not a key").is_err());
    }

    #[test]
    fn parse_pem_rejects_garbage() {
        assert!(matches!(parse_pem("garbage"), Err(PkiError::ParseError(_))));
    }
}
