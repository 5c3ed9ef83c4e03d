// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate lifecycle manager.
//!
//! Owns certificate rows and drives issuance and renewal through a
//! [`CertificateAuthority`].
//!
//! # Status Flow
//!
//! ```text
//! Issue:  queued ──CA ok──▶ issued          queued ──CA error──▶ failed
//! Renew:  issued ──▶ renewing ──CA ok──▶ issued
//!                            └─CA error─▶ issued (still valid) | failed (expired)
//! ```
//!
//! Issuance and renewal are single-flight per domain. A caller that arrives
//! while an issuance for the same domain is in flight joins it and receives
//! its outcome, success or failure; the CA is asked once. Issuance and
//! renewal of one domain never overlap.
//!
//! The CA call and the row update that follows run on a spawned task, so a
//! caller that goes away mid-request never strands a row in `renewing` or
//! `queued`.
//!
//! Renewal keeps the same row and the files on disk are only replaced on
//! success, so the previous certificate keeps serving while a renewal runs.

use crate::acme::{CertificateAuthority, IssuedCertificate};
use crate::errors::{CaError, CertificateError, StoreError};
use crate::locks::KeyedLocks;
use crate::metrics;
use crate::models::{normalize_domain_name, Certificate, CertificateStatus, DomainStatus};
use crate::store::Store;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Flight = Shared<BoxFuture<'static, Result<Certificate, CertificateError>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Operation {
    Issue,
    Renew,
}

type FlightKey = (Operation, String);

/// Issues and renews certificates.
pub struct CertificateManager {
    lifecycle: Arc<Lifecycle>,
}

/// State shared with the spawned issuance tasks.
struct Lifecycle {
    store: Arc<dyn Store>,
    row_locks: Arc<KeyedLocks>,
    issuance_locks: KeyedLocks,
    authority: Arc<dyn CertificateAuthority>,
    ca_timeout: Duration,
    flights: Mutex<HashMap<FlightKey, (u64, Flight)>>,
    next_flight: AtomicU64,
}

/// Removes a flight from the table when its task ends, panics included.
struct FlightGuard {
    lifecycle: Arc<Lifecycle>,
    key: FlightKey,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut flights = self
            .lifecycle
            .flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if flights.get(&self.key).is_some_and(|(id, _)| *id == self.id) {
            flights.remove(&self.key);
        }
    }
}

/// Certificates with status `issued` expiring in `[now, now + within)`.
///
/// Certificates without an expiry are never returned.
#[must_use]
pub fn expiring_within(
    certificates: &[Certificate],
    now: DateTime<Utc>,
    within: chrono::Duration,
) -> Vec<Certificate> {
    let horizon = now + within;
    certificates
        .iter()
        .filter(|c| c.status == CertificateStatus::Issued)
        .filter(|c| c.expires_at.is_some_and(|t| t >= now && t < horizon))
        .cloned()
        .collect()
}

/// Loose sanity check on an ACME contact address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

impl CertificateManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        row_locks: Arc<KeyedLocks>,
        authority: Arc<dyn CertificateAuthority>,
        ca_timeout: Duration,
    ) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle {
                store,
                row_locks,
                issuance_locks: KeyedLocks::new(),
                authority,
                ca_timeout,
                flights: Mutex::new(HashMap::new()),
                next_flight: AtomicU64::new(0),
            }),
        }
    }

    fn normalize(domain: &str) -> Result<String, CertificateError> {
        normalize_domain_name(domain).map_err(|_| CertificateError::DomainNotFound {
            domain: domain.to_string(),
        })
    }

    /// Join the in-flight `operation` for `name`, or spawn `work` as a new one.
    async fn single_flight<F, Fut>(
        &self,
        operation: Operation,
        name: String,
        work: F,
    ) -> Result<Certificate, CertificateError>
    where
        F: FnOnce(Arc<Lifecycle>, String) -> Fut,
        Fut: Future<Output = Result<Certificate, CertificateError>> + Send + 'static,
    {
        let key = (operation, name);
        let flight = {
            let mut flights = self
                .lifecycle
                .flights
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some((_, flight)) = flights.get(&key) {
                debug!(domain = %key.1, operation = ?operation, "Joining in-flight certificate operation");
                flight.clone()
            } else {
                let id = self.lifecycle.next_flight.fetch_add(1, Ordering::Relaxed);
                let guard = FlightGuard {
                    lifecycle: Arc::clone(&self.lifecycle),
                    key: key.clone(),
                    id,
                };
                let task = work(Arc::clone(&self.lifecycle), key.1.clone());
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    task.await
                });
                let domain = key.1.clone();
                let flight = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(CertificateError::Interrupted {
                            domain,
                            reason: e.to_string(),
                        })
                    })
                }
                .boxed()
                .shared();
                flights.insert(key, (id, flight.clone()));
                flight
            }
        };
        flight.await
    }

    /// Issue a certificate for a verified domain.
    ///
    /// Returns the current certificate unchanged if one is already issued or
    /// renewing. Concurrent callers share one issuance, and with it the
    /// contact email of the first caller.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::InvalidEmail`],
    /// [`CertificateError::DomainNotFound`] or
    /// [`CertificateError::DomainNotVerified`] without touching any row, and
    /// [`CertificateError::Authority`] after recording the failure on the
    /// certificate.
    pub async fn issue(&self, domain: &str, email: &str) -> Result<Certificate, CertificateError> {
        if !is_valid_email(email) {
            return Err(CertificateError::InvalidEmail {
                email: email.to_string(),
            });
        }
        let name = Self::normalize(domain)?;
        let email = email.to_string();
        self.single_flight(Operation::Issue, name, move |lifecycle, name| async move {
            lifecycle.issue(&name, &email).await
        })
        .await
    }

    /// Renew the domain's current certificate.
    ///
    /// On failure the certificate goes back to `issued` while it is still valid,
    /// and to `failed` once it has expired.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::NoCertificate`] without a current
    /// certificate, [`CertificateError::NotRenewable`] for a queued one, and
    /// [`CertificateError::Authority`] if the CA fails.
    pub async fn renew(&self, domain: &str) -> Result<Certificate, CertificateError> {
        let name = Self::normalize(domain)?;
        self.single_flight(Operation::Renew, name, |lifecycle, name| async move {
            lifecycle.renew(&name).await
        })
        .await
    }

    /// The domain's current certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::NoCertificate`] if there is none.
    pub async fn get_by_domain(&self, domain: &str) -> Result<Certificate, CertificateError> {
        let name = Self::normalize(domain)?;
        self.lifecycle
            .store
            .current_certificate(&name)
            .await?
            .ok_or(CertificateError::NoCertificate { domain: name })
    }

    /// All certificates, including failed ones.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Store`] if the store is unavailable.
    pub async fn list(&self) -> Result<Vec<Certificate>, CertificateError> {
        Ok(self.lifecycle.store.list_certificates().await?)
    }

    /// Issued certificates expiring within `within` from now.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Store`] if the store is unavailable.
    pub async fn list_expiring_soon(
        &self,
        within: chrono::Duration,
    ) -> Result<Vec<Certificate>, CertificateError> {
        let certificates = self.lifecycle.store.list_certificates().await?;
        Ok(expiring_within(&certificates, Utc::now(), within))
    }
}

impl Lifecycle {
    /// Call the CA under the configured timeout.
    async fn request(&self, domain: &str, email: &str) -> Result<IssuedCertificate, CaError> {
        match tokio::time::timeout(
            self.ca_timeout,
            self.authority.issue_certificate(domain, email),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CaError::Timeout {
                domain: domain.to_string(),
                timeout_ms: u64::try_from(self.ca_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Point the domain at `certificate_id`. A domain deleted meanwhile is skipped.
    async fn attach_to_domain(&self, domain: &str, certificate_id: Uuid) -> Result<(), StoreError> {
        let _guard = self.row_locks.lock(domain).await;
        let mut row = match self.store.get_domain(domain).await {
            Ok(row) => row,
            Err(StoreError::NotFound { .. }) => {
                warn!(domain = %domain, "Domain deleted during issuance, certificate not attached");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if row.certificate_id != Some(certificate_id) {
            row.certificate_id = Some(certificate_id);
            row.updated_at = Utc::now();
            self.store.update_domain(row).await?;
        }
        Ok(())
    }

    async fn issue(&self, name: &str, email: &str) -> Result<Certificate, CertificateError> {
        let _issuing = self.issuance_locks.lock(name).await;

        let row = match self.store.get_domain(name).await {
            Ok(row) => row,
            Err(StoreError::NotFound { .. }) => {
                return Err(CertificateError::DomainNotFound {
                    domain: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !matches!(row.status, DomainStatus::Verified | DomainStatus::Active) {
            return Err(CertificateError::DomainNotVerified {
                domain: name.to_string(),
                status: row.status,
            });
        }

        let mut certificate = match self.store.current_certificate(name).await? {
            Some(current) if current.status.is_servable() => {
                debug!(domain = %name, certificate_id = %current.id, "Certificate already issued");
                self.attach_to_domain(name, current.id).await?;
                return Ok(current);
            }
            // Left queued by an interrupted issuance; reuse the row
            Some(mut stale) => {
                stale.email = email.to_string();
                stale.updated_at = Utc::now();
                self.store.update_certificate(stale).await?
            }
            None => {
                let queued = self
                    .store
                    .insert_certificate(Certificate::queued(name, email))
                    .await?;
                metrics::record_object_created("certificate");
                queued
            }
        };
        info!(domain = %name, certificate_id = %certificate.id, "Certificate issuance queued");

        match self.request(name, email).await {
            Ok(issued) => {
                let now = Utc::now();
                certificate.status = CertificateStatus::Issued;
                certificate.expires_at = Some(issued.expires_at);
                certificate.last_issued_at = Some(now);
                certificate.updated_at = now;
                let certificate = self.store.update_certificate(certificate).await?;
                self.attach_to_domain(name, certificate.id).await?;
                metrics::record_certificate_operation("issue", true);
                info!(
                    domain = %name,
                    certificate_id = %certificate.id,
                    expires_at = %issued.expires_at,
                    "Certificate issued"
                );
                Ok(certificate)
            }
            Err(e) => {
                warn!(domain = %name, error = %e, "Certificate issuance failed");
                metrics::record_certificate_operation("issue", false);
                metrics::record_error("certificate", e.is_transient());
                certificate.status = CertificateStatus::Failed;
                certificate.last_error = Some(e.to_string());
                certificate.updated_at = Utc::now();
                self.store.update_certificate(certificate).await?;
                Err(CertificateError::Authority {
                    domain: name.to_string(),
                    source: e,
                })
            }
        }
    }

    async fn renew(&self, name: &str) -> Result<Certificate, CertificateError> {
        let _issuing = self.issuance_locks.lock(name).await;

        let mut certificate = self
            .store
            .current_certificate(name)
            .await?
            .ok_or_else(|| CertificateError::NoCertificate {
                domain: name.to_string(),
            })?;
        if !certificate.status.is_servable() {
            return Err(CertificateError::NotRenewable {
                id: certificate.id,
                status: certificate.status,
            });
        }

        certificate.status = CertificateStatus::Renewing;
        certificate.updated_at = Utc::now();
        let mut certificate = self.store.update_certificate(certificate).await?;
        info!(
            domain = %name,
            certificate_id = %certificate.id,
            expires_at = ?certificate.expires_at,
            "Renewing certificate"
        );

        let email = certificate.email.clone();
        match self.request(name, &email).await {
            Ok(issued) => {
                let now = Utc::now();
                certificate.status = CertificateStatus::Issued;
                certificate.expires_at = Some(issued.expires_at);
                certificate.last_issued_at = Some(now);
                certificate.last_error = None;
                certificate.updated_at = now;
                let certificate = self.store.update_certificate(certificate).await?;
                metrics::record_certificate_operation("renew", true);
                info!(
                    domain = %name,
                    certificate_id = %certificate.id,
                    expires_at = %issued.expires_at,
                    "Certificate renewed"
                );
                Ok(certificate)
            }
            Err(e) => {
                let now = Utc::now();
                certificate.status = if certificate.is_valid_at(now) {
                    CertificateStatus::Issued
                } else {
                    CertificateStatus::Failed
                };
                certificate.last_error = Some(e.to_string());
                certificate.updated_at = now;
                warn!(
                    domain = %name,
                    certificate_id = %certificate.id,
                    status = %certificate.status,
                    error = %e,
                    "Certificate renewal failed"
                );
                metrics::record_certificate_operation("renew", false);
                metrics::record_error("certificate", e.is_transient());
                self.store.update_certificate(certificate).await?;
                Err(CertificateError::Authority {
                    domain: name.to_string(),
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "certificate_tests.rs"]
mod certificate_tests;
