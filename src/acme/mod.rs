// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate authority client.
//!
//! The certificate lifecycle manager talks to a CA through [`CertificateAuthority`].
//! [`client::AcmeAuthority`] implements it with ACME DNS-01 challenges published
//! through the domain's DNS provider.
//!
//! # On-disk Layout
//!
//! ```text
//! <cert_dir>/
//! ├── account.json              # ACME account credentials, keyed by contact email
//! └── <domain>/
//!     ├── fullchain.pem         # leaf + intermediates
//!     └── privkey.pem           # private key (0600)
//! ```
//!
//! The proxy reconciler derives certificate paths from the domain name with
//! [`CertificatePaths::for_domain`], so a renewal that rewrites the files in place
//! only needs a reload to take effect.

pub mod client;

use crate::constants::{ACME_CHALLENGE_RECORD_PREFIX, CERT_CHAIN_FILE, CERT_KEY_FILE};
use crate::errors::CaError;
use crate::fsutil::atomic_write;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Result of a successful issuance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub expires_at: DateTime<Utc>,
    pub chain_path: PathBuf,
    pub key_path: PathBuf,
}

/// Issues certificates for domains whose control has been proven.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Obtain a fresh certificate for `domain`, registering `email` as contact.
    async fn issue_certificate(&self, domain: &str, email: &str)
        -> Result<IssuedCertificate, CaError>;
}

/// Where a domain's certificate material lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificatePaths {
    pub chain: PathBuf,
    pub key: PathBuf,
}

impl CertificatePaths {
    /// Paths for `domain` under `cert_dir`.
    #[must_use]
    pub fn for_domain(cert_dir: &Path, domain: &str) -> Self {
        let dir = cert_dir.join(domain);
        Self {
            chain: dir.join(CERT_CHAIN_FILE),
            key: dir.join(CERT_KEY_FILE),
        }
    }

    /// Atomically write the chain and key as a pair.
    ///
    /// The key is written first so a chain never exists without its key. If the
    /// chain cannot be written the previous key is put back, or the new key is
    /// removed when there was none, so the pair on disk always matches.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::Storage`] if either file cannot be written.
    pub fn write(&self, chain_pem: &str, key_pem: &str) -> Result<(), CaError> {
        let storage_error = |path: &Path, e: std::io::Error| CaError::Storage {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let previous_key = match std::fs::read(&self.key) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(storage_error(&self.key, e)),
        };

        atomic_write(&self.key, key_pem.as_bytes(), true)
            .map_err(|e| storage_error(&self.key, e))?;
        if let Err(e) = atomic_write(&self.chain, chain_pem.as_bytes(), false) {
            let restored = match &previous_key {
                Some(bytes) => atomic_write(&self.key, bytes, true),
                None => std::fs::remove_file(&self.key),
            };
            if let Err(restore) = restored {
                warn!(path = %self.key.display(), error = %restore, "Failed to restore previous key");
            }
            return Err(storage_error(&self.chain, e));
        }
        Ok(())
    }
}

/// Name of the ACME DNS-01 challenge record for a domain.
#[must_use]
pub fn acme_challenge_record_name(domain: &str) -> String {
    format!("{ACME_CHALLENGE_RECORD_PREFIX}.{domain}")
}

/// DNS-01 TXT value: base64url(SHA-256(key authorization)), RFC 8555 §8.4.
#[must_use]
pub fn dns01_challenge_value(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_authorization.as_bytes()))
}

/// Expiry (`notAfter`) of the first certificate in a PEM chain.
///
/// # Errors
///
/// Returns [`CaError::CertificateParse`] if the PEM or certificate is malformed.
pub fn parse_certificate_expiry(chain_pem: &str) -> Result<DateTime<Utc>, CaError> {
    use x509_parser::prelude::*;

    let (_, pem) = pem::parse_x509_pem(chain_pem.as_bytes())
        .map_err(|e| CaError::CertificateParse(format!("failed to parse PEM: {e}")))?;
    let (_, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| CaError::CertificateParse(format!("failed to parse certificate: {e}")))?;

    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| CaError::CertificateParse("invalid expiry timestamp".to_string()))
}
