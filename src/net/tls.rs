//! TLS policy construction and certificate inspection.
//!
//! # Responsibilities
//! - Parse the configured certificate chain and private key
//! - Inspect the leaf certificate (DNS names, issuer, expiry)
//! - Assemble the hardened rustls server configuration
//!
//! # Design Decisions
//! - Any parse failure is returned as `TlsError`; the caller treats it as fatal
//! - The first chain entry must be the leaf; a CA certificate there is rejected
//! - The policy lists suites and curves by IANA identifier in preference order.
//!   Entries the crypto provider does not implement are skipped when the
//!   rustls config is assembled (rustls ships no CBC suites and no P-521)

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{CipherSuite, NamedGroup, ServerConfig};
use thiserror::Error;
use tracing::Level;

/// Remaining validity below which a certificate is reported as expiring soon.
pub const EXPIRY_WARNING_THRESHOLD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Cipher suites in server preference order. Modern AEAD suites first, one
/// legacy CBC suite last for old clients.
pub const CIPHER_SUITES: [CipherSuite; 6] = [
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256,
];

/// Key exchange curves, strongest first.
pub const CURVE_PREFERENCES: [NamedGroup; 3] = [
    NamedGroup::secp521r1,
    NamedGroup::secp384r1,
    NamedGroup::secp256r1,
];

/// Error building the TLS policy.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("unable to read TLS material: {0}")]
    Io(#[from] std::io::Error),

    #[error("no certificate found in PEM input")]
    NoCertificate,

    #[error("no private key found in PEM input")]
    NoPrivateKey,

    #[error("unable to parse leaf certificate: {0}")]
    Certificate(String),

    #[error("first certificate in the chain is a CA certificate, expected the leaf first")]
    LeafNotFirst,

    #[error("none of the configured {0} are supported by the crypto provider")]
    Unsupported(&'static str),

    #[error("rustls rejected the configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// How close a certificate is to its not-after date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateExpiry {
    /// More than the warning threshold remains.
    Valid,
    /// Less than the warning threshold remains.
    ExpiringSoon,
    /// The not-after date has passed.
    Expired,
}

impl CertificateExpiry {
    /// Classify a certificate's remaining validity at `now`.
    pub fn classify(not_after: SystemTime, now: SystemTime) -> Self {
        match not_after.duration_since(now) {
            Err(_) => CertificateExpiry::Expired,
            Ok(remaining) if remaining < EXPIRY_WARNING_THRESHOLD => CertificateExpiry::ExpiringSoon,
            Ok(_) => CertificateExpiry::Valid,
        }
    }

    /// Log level used to report this state at boot.
    pub fn severity(self) -> Level {
        match self {
            CertificateExpiry::Valid => Level::DEBUG,
            CertificateExpiry::ExpiringSoon | CertificateExpiry::Expired => Level::WARN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CertificateExpiry::Valid => "valid",
            CertificateExpiry::ExpiringSoon => "expiring_soon",
            CertificateExpiry::Expired => "expired",
        }
    }
}

/// Facts read from the leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCertificate {
    pub dns_names: Vec<String>,
    pub issuer_common_name: Option<String>,
    pub not_after: SystemTime,
}

impl LeafCertificate {
    /// Parse a DER certificate and check it is an end-entity certificate.
    pub fn parse(der: &CertificateDer<'_>) -> Result<Self, TlsError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
            .map_err(|e| TlsError::Certificate(e.to_string()))?;

        if cert.is_ca() {
            return Err(TlsError::LeafNotFirst);
        }

        let dns_names = cert
            .subject_alternative_name()
            .map_err(|e| TlsError::Certificate(e.to_string()))?
            .map(|san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        x509_parser::extensions::GeneralName::DNSName(dns) => Some(dns.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let issuer_common_name = cert
            .issuer()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        let timestamp = cert.validity().not_after.timestamp();
        let not_after = if timestamp >= 0 {
            UNIX_EPOCH + Duration::from_secs(timestamp as u64)
        } else {
            UNIX_EPOCH
        };

        Ok(Self {
            dns_names,
            issuer_common_name,
            not_after,
        })
    }

    pub fn expiry(&self, now: SystemTime) -> CertificateExpiry {
        CertificateExpiry::classify(self.not_after, now)
    }
}

/// The resolved TLS policy for the downstream listener.
#[derive(Debug, Clone)]
pub struct TlsPolicy {
    leaf: LeafCertificate,
    expiry: CertificateExpiry,
    server_config: Arc<ServerConfig>,
}

impl TlsPolicy {
    /// Build the policy from PEM certificate chain and key.
    pub fn build(cert_pem: &str, key_pem: &str) -> Result<Self, TlsError> {
        Self::build_at(cert_pem, key_pem, SystemTime::now())
    }

    /// Build the policy, classifying expiry relative to `now`.
    pub fn build_at(cert_pem: &str, key_pem: &str, now: SystemTime) -> Result<Self, TlsError> {
        let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes()).collect::<Result<Vec<_>, _>>()?;
        let first = certs.first().ok_or(TlsError::NoCertificate)?;
        let leaf = LeafCertificate::parse(first)?;

        let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())?.ok_or(TlsError::NoPrivateKey)?;

        let server_config = Arc::new(server_config(certs, key)?);

        let expiry = leaf.expiry(now);
        let remaining_days = leaf
            .not_after
            .duration_since(now)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(0);
        let issuer = leaf.issuer_common_name.as_deref().unwrap_or("unknown");

        if expiry.severity() == Level::WARN {
            tracing::warn!(
                dns_names = ?leaf.dns_names,
                issuer = %issuer,
                expires_in_days = remaining_days,
                expiry = expiry.as_str(),
                "Parsed TLS certificate, expiring soon"
            );
        } else {
            tracing::debug!(
                dns_names = ?leaf.dns_names,
                issuer = %issuer,
                expires_in_days = remaining_days,
                expiry = expiry.as_str(),
                "Parsed TLS certificate"
            );
        }

        Ok(Self {
            leaf,
            expiry,
            server_config,
        })
    }

    pub fn leaf(&self) -> &LeafCertificate {
        &self.leaf
    }

    /// Expiry state observed when the policy was built.
    pub fn expiry(&self) -> CertificateExpiry {
        self.expiry
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }
}

/// Crypto provider restricted to the policy's suites and curves, in order.
pub fn policy_provider() -> Result<CryptoProvider, TlsError> {
    let base = aws_lc_rs::default_provider();

    let cipher_suites: Vec<_> = CIPHER_SUITES
        .iter()
        .filter_map(|id| {
            let found = base.cipher_suites.iter().find(|s| s.suite() == *id).copied();
            if found.is_none() {
                tracing::trace!(suite = ?id, "Cipher suite not provided, skipping");
            }
            found
        })
        .collect();
    if cipher_suites.is_empty() {
        return Err(TlsError::Unsupported("cipher suites"));
    }

    let kx_groups: Vec<_> = CURVE_PREFERENCES
        .iter()
        .filter_map(|id| {
            let found = base.kx_groups.iter().find(|g| g.name() == *id).copied();
            if found.is_none() {
                tracing::trace!(curve = ?id, "Curve not provided, skipping");
            }
            found
        })
        .collect();
    if kx_groups.is_empty() {
        return Err(TlsError::Unsupported("curves"));
    }

    Ok(CryptoProvider {
        cipher_suites,
        kx_groups,
        ..base
    })
}

fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, TlsError> {
    let mut config = ServerConfig::builder_with_provider(Arc::new(policy_provider()?))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    // server picks the suite
    config.ignore_client_order = true;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}
