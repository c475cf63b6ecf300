//! Certificate/key loading and CN-based peer identity, shared by the cluster
//! transport's listener and dialer.

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, pkcs8_private_keys};

use crate::error::{IoError, IoResult};

/// Paths to the material needed to stand up mandatory cluster TLS. The CA is
/// required, unlike a typical server-only TLS setup, because every cluster
/// connection -- inbound or outbound -- authenticates with a client certificate.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_file: String,
    pub key_file: String,
    pub ca_file: String,
}

impl TlsMaterial {
    pub fn new(cert_file: impl Into<String>, key_file: impl Into<String>, ca_file: impl Into<String>) -> Self {
        Self {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            ca_file: ca_file.into(),
        }
    }

    pub fn validate(&self) -> IoResult<()> {
        for (label, path) in [
            ("certificate", &self.cert_file),
            ("private key", &self.key_file),
            ("CA certificate", &self.ca_file),
        ] {
            if !Path::new(path).exists() {
                return Err(IoError::Tls(format!("{label} file not found: {path}")));
            }
        }
        Ok(())
    }

    fn load_certs(path: &str) -> IoResult<Vec<CertificateDer<'static>>> {
        let data = fs::read(path).map_err(|e| IoError::Tls(format!("reading {path}: {e}")))?;
        let mut reader = BufReader::new(data.as_slice());
        certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IoError::Tls(format!("parsing certificates in {path}: {e}")))
    }

    fn load_key(path: &str) -> IoResult<PrivateKeyDer<'static>> {
        let data = fs::read(path).map_err(|e| IoError::Tls(format!("reading {path}: {e}")))?;
        let mut reader = BufReader::new(data.as_slice());
        let mut keys = pkcs8_private_keys(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IoError::Tls(format!("parsing private key in {path}: {e}")))?;
        keys.pop()
            .map(PrivateKeyDer::Pkcs8)
            .ok_or_else(|| IoError::Tls(format!("no private key found in {path}")))
    }

    fn root_store(&self) -> IoResult<rustls::RootCertStore> {
        let mut store = rustls::RootCertStore::empty();
        for cert in Self::load_certs(&self.ca_file)? {
            store
                .add(cert)
                .map_err(|e| IoError::Tls(format!("adding CA certificate: {e}")))?;
        }
        Ok(store)
    }

    /// Server config that requires and verifies a client certificate against the
    /// configured CA, matching the handshake contract: TCP, then TLS, then identity
    /// resolution from the presented certificate's CN.
    pub fn server_config(&self) -> IoResult<Arc<rustls::ServerConfig>> {
        self.validate()?;
        let certs = Self::load_certs(&self.cert_file)?;
        let key = Self::load_key(&self.key_file)?;
        let roots = self.root_store()?;
        let verifier = rustls::server::WebPkiClientVerifier::builder(roots.into())
            .build()
            .map_err(|e| IoError::Tls(format!("building client verifier: {e}")))?;
        let config = rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| IoError::Tls(format!("building server config: {e}")))?;
        Ok(Arc::new(config))
    }

    /// Client config that always presents a certificate (the dialing side is
    /// identified the same way the listening side is).
    pub fn client_config(&self) -> IoResult<Arc<rustls::ClientConfig>> {
        self.validate()?;
        let certs = Self::load_certs(&self.cert_file)?;
        let key = Self::load_key(&self.key_file)?;
        let roots = self.root_store()?;
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| IoError::Tls(format!("building client config: {e}")))?;
        Ok(Arc::new(config))
    }
}

/// Extract the subject Common Name from a peer certificate, used to bind an
/// authenticated connection to a configured `Endpoint`.
pub fn peer_common_name(cert: &CertificateDer<'_>) -> Option<String> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
    parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_reports_missing_files() {
        let material = TlsMaterial::new("/no/such/cert.pem", "/no/such/key.pem", "/no/such/ca.pem");
        let err = material.validate().unwrap_err();
        assert!(matches!(err, IoError::Tls(_)));
    }
}
