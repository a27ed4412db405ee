//! Optional TLS for the KioskLink backend
//!
//! Either loads an operator-supplied PEM certificate/key pair or generates a
//! self-signed one and keeps it next to the credential store so devices can
//! pin a stable fingerprint across restarts.

use axum_server::tls_rustls::RustlsConfig;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// TLS setup errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),
}

pub type TlsResult<T> = Result<T, TlsError>;

/// Where the server certificate comes from
#[derive(Debug, Clone)]
pub enum TlsSource {
    /// Operator-provided PEM files
    Files { cert: PathBuf, key: PathBuf },
    /// Self-signed certificate persisted in `dir`
    SelfSigned { dir: PathBuf, hostnames: Vec<String> },
}

/// Loaded certificate material
pub struct TlsMaterial {
    pub cert_pem: String,
    pub key_pem: String,
    /// Colon-separated SHA-256 of the certificate PEM
    pub fingerprint: String,
}

impl TlsMaterial {
    /// Build the rustls server configuration
    pub async fn rustls_config(&self) -> TlsResult<RustlsConfig> {
        let config = RustlsConfig::from_pem(
            self.cert_pem.as_bytes().to_vec(),
            self.key_pem.as_bytes().to_vec(),
        )
        .await?;
        Ok(config)
    }
}

impl TlsSource {
    /// Read or create the certificate material
    pub fn load(&self) -> TlsResult<TlsMaterial> {
        let (cert_pem, key_pem) = match self {
            TlsSource::Files { cert, key } => {
                info!("Loading TLS certificate from {:?}", cert);
                (std::fs::read_to_string(cert)?, std::fs::read_to_string(key)?)
            }
            TlsSource::SelfSigned { dir, hostnames } => load_or_generate(dir, hostnames)?,
        };
        let fingerprint = calculate_cert_fingerprint(&cert_pem);
        Ok(TlsMaterial {
            cert_pem,
            key_pem,
            fingerprint,
        })
    }
}

fn load_or_generate(dir: &Path, hostnames: &[String]) -> TlsResult<(String, String)> {
    std::fs::create_dir_all(dir)?;
    let cert_path = dir.join("server.crt");
    let key_path = dir.join("server.key");

    if cert_path.exists() && key_path.exists() {
        info!("Loading existing self-signed certificate from {:?}", cert_path);
        return Ok((
            std::fs::read_to_string(&cert_path)?,
            std::fs::read_to_string(&key_path)?,
        ));
    }

    info!("Generating new self-signed certificate...");
    let (cert_pem, key_pem) = generate_self_signed_cert(hostnames)?;
    std::fs::write(&cert_path, &cert_pem)?;
    write_private_key(&key_path, &key_pem)?;
    info!("Certificate saved to {:?}", cert_path);
    Ok((cert_pem, key_pem))
}

/// Write the private key readable by the owner only
fn write_private_key(path: &Path, key_pem: &str) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(key_pem.as_bytes())
}

/// Generate a self-signed certificate for the given hostnames/IPs
pub fn generate_self_signed_cert(hostnames: &[String]) -> TlsResult<(String, String)> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "KioskLink");
    dn.push(DnType::OrganizationName, "KioskLink");
    params.distinguished_name = dn;

    let mut san_list = vec![
        SanType::DnsName("localhost".try_into()?),
        SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    ];
    for hostname in hostnames {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            san_list.push(SanType::IpAddress(ip));
        } else if let Ok(dns) = hostname.as_str().try_into() {
            san_list.push(SanType::DnsName(dns));
        }
    }
    params.subject_alt_names = san_list;

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

/// SHA-256 fingerprint of a certificate as colon-separated hex pairs
pub fn calculate_cert_fingerprint(cert_pem: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cert_pem.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cert_generation() {
        let hostnames = vec!["192.168.1.100".to_string(), "kiosk.local".to_string()];
        let (cert, key) = generate_self_signed_cert(&hostnames).unwrap();
        assert!(cert.contains("BEGIN CERTIFICATE"));
        assert!(key.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = calculate_cert_fingerprint("-----BEGIN CERTIFICATE-----\ntest\n-----END CERTIFICATE-----");
        assert_eq!(fp.len(), 95); // 32 bytes * 2 hex + 31 colons
    }

    #[test]
    fn test_self_signed_is_stable_across_loads() {
        let dir = tempdir().unwrap();
        let source = TlsSource::SelfSigned {
            dir: dir.path().join("tls"),
            hostnames: vec!["localhost".to_string()],
        };

        let first = source.load().unwrap();
        let second = source.load().unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.cert_pem, second.cert_pem);
    }

    #[cfg(unix)]
    #[test]
    fn test_generated_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let source = TlsSource::SelfSigned {
            dir: dir.path().to_path_buf(),
            hostnames: Vec::new(),
        };
        source.load().unwrap();

        let mode = std::fs::metadata(dir.path().join("server.key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_files_error() {
        let dir = tempdir().unwrap();
        let source = TlsSource::Files {
            cert: dir.path().join("missing.crt"),
            key: dir.path().join("missing.key"),
        };
        assert!(matches!(source.load(), Err(TlsError::Io(_))));
    }
}
