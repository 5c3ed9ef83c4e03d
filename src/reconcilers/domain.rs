// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain verification state machine.
//!
//! Owns domain rows and their verification tokens.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──IssueChallenge──▶ verifying ──CheckChallenge──▶ verified ──Activate──▶ active
//!    ▲                                                                              │
//!    └──────────── Reset ──── error ◀──────────── MarkError (from any status) ──────┘
//! ```
//!
//! - The verification token is generated at creation and never rotated, so
//!   issuing a challenge twice publishes the same value.
//! - A failed or mismatching check only records `verification_checked_at`;
//!   propagation delay is expected and is surfaced by the pipeline, not here.
//! - Auto-configuration publishes records through the provider but never moves
//!   the status; a check is still required.
//!
//! Every read-modify-write on a domain row runs under the per-domain row lock.

use crate::constants::VERIFICATION_RECORD_TYPE;
use crate::dns::{DnsInspector, ZoneDetector};
use crate::errors::{DomainError, StoreError};
use crate::locks::KeyedLocks;
use crate::metrics;
use crate::models::{normalize_domain_name, Challenge, Domain, DomainStatus};
use crate::provider::ProviderRegistry;
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a challenge check.
#[derive(Clone, Debug, PartialEq)]
pub struct ChallengeCheck {
    /// Whether the published TXT values contained the token
    pub matched: bool,
    /// Domain after the check
    pub domain: Domain,
}

/// Records published by auto-configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoConfigured {
    pub txt_record_id: String,
    /// Set for non-apex names
    pub cname_record_id: Option<String>,
}

/// Drives domains from `pending` to `active`.
pub struct DomainVerifier {
    store: Arc<dyn Store>,
    row_locks: Arc<KeyedLocks>,
    dns: Arc<dyn DnsInspector>,
    zones: Arc<dyn ZoneDetector>,
    providers: ProviderRegistry,
    edge_host: String,
}

/// Map a store lookup failure on `name` to a domain error.
fn domain_store_error(name: &str, error: StoreError) -> DomainError {
    match error {
        StoreError::NotFound { .. } => DomainError::NotFound {
            name: name.to_string(),
        },
        StoreError::Conflict { .. } => DomainError::AlreadyExists {
            name: name.to_string(),
        },
        other => DomainError::Store(other),
    }
}

impl DomainVerifier {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        row_locks: Arc<KeyedLocks>,
        dns: Arc<dyn DnsInspector>,
        zones: Arc<dyn ZoneDetector>,
        providers: ProviderRegistry,
        edge_host: String,
    ) -> Self {
        Self {
            store,
            row_locks,
            dns,
            zones,
            providers,
            edge_host,
        }
    }

    /// Public host non-apex domains CNAME to.
    #[must_use]
    pub fn edge_host(&self) -> &str {
        &self.edge_host
    }

    async fn load(&self, name: &str) -> Result<Domain, DomainError> {
        self.store
            .get_domain(name)
            .await
            .map_err(|e| domain_store_error(name, e))
    }

    async fn save(&self, domain: Domain) -> Result<Domain, DomainError> {
        let name = domain.name.clone();
        self.store
            .update_domain(domain)
            .await
            .map_err(|e| domain_store_error(&name, e))
    }

    /// Register a new pending domain.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidName`] for malformed names and
    /// [`DomainError::AlreadyExists`] if the name is taken.
    pub async fn create(&self, raw_name: &str) -> Result<Domain, DomainError> {
        let name = normalize_domain_name(raw_name)?;
        let domain = self
            .store
            .insert_domain(Domain::new(name.clone()))
            .await
            .map_err(|e| domain_store_error(&name, e))?;
        metrics::record_object_created("domain");
        info!(domain = %domain.name, "Domain created");
        Ok(domain)
    }

    /// Fetch a domain.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the domain is not registered.
    pub async fn get(&self, name: &str) -> Result<Domain, DomainError> {
        let name = normalize_domain_name(name)?;
        self.load(&name).await
    }

    /// List domains, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Store`] if the store is unavailable.
    pub async fn list(&self, status: Option<DomainStatus>) -> Result<Vec<Domain>, DomainError> {
        Ok(self.store.list_domains(status).await?)
    }

    /// Delete a domain. Issued certificates are kept.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the domain is not registered.
    pub async fn delete(&self, name: &str) -> Result<(), DomainError> {
        let name = normalize_domain_name(name)?;
        let _guard = self.row_locks.lock(&name).await;
        self.store
            .delete_domain(&name)
            .await
            .map_err(|e| domain_store_error(&name, e))?;
        metrics::record_object_deleted("domain");
        info!(domain = %name, "Domain deleted");
        Ok(())
    }

    /// Detect the provider and zone hosting the domain and record them.
    ///
    /// The provider zone id is only resolved when credentials for that provider
    /// are configured; otherwise it stays unset and auto-configuration is
    /// unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Dns`] if no zone can be found and
    /// [`DomainError::Provider`] if the provider lookup fails.
    pub async fn detect_zone(&self, name: &str) -> Result<Domain, DomainError> {
        let name = normalize_domain_name(name)?;
        let zone = self.zones.get_zone_info(&name).await?;
        debug!(domain = %name, provider = %zone.provider, zone = %zone.zone, "Detected zone");

        let zone_id = match self.providers.get(&zone.provider) {
            Some(client) => Some(client.get_zone_id(&zone.zone).await?),
            None => {
                debug!(domain = %name, provider = %zone.provider, "No credentials for provider");
                None
            }
        };

        let _guard = self.row_locks.lock(&name).await;
        let mut domain = self.load(&name).await?;
        domain.provider = Some(zone.provider);
        domain.zone_name = Some(zone.zone);
        domain.zone_id = zone_id;
        domain.updated_at = Utc::now();
        let domain = self.save(domain).await?;
        info!(
            domain = %domain.name,
            provider = ?domain.provider,
            zone_id = ?domain.zone_id,
            "Zone recorded"
        );
        Ok(domain)
    }

    /// Issue the ownership challenge, moving `pending` to `verifying`.
    ///
    /// Idempotent: the token never changes, and domains already past
    /// `verifying` keep their status.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] for domains in `error`.
    pub async fn issue_challenge(&self, name: &str) -> Result<Challenge, DomainError> {
        let name = normalize_domain_name(name)?;
        let _guard = self.row_locks.lock(&name).await;
        let mut domain = self.load(&name).await?;

        match domain.status {
            DomainStatus::Pending => {
                domain.transition(DomainStatus::Verifying)?;
                domain = self.save(domain).await?;
                info!(domain = %domain.name, "Verification challenge issued");
            }
            DomainStatus::Error => {
                return Err(DomainError::InvalidTransition {
                    name: domain.name,
                    from: DomainStatus::Error,
                    to: DomainStatus::Verifying,
                });
            }
            _ => debug!(domain = %domain.name, status = %domain.status, "Challenge reissued"),
        }

        Ok(Challenge {
            record_type: VERIFICATION_RECORD_TYPE.to_string(),
            record_name: domain.challenge_record_name(),
            value: domain.verification_token,
        })
    }

    /// Look up the challenge record and compare it with the token.
    ///
    /// `verification_checked_at` is updated whatever the outcome. A match moves
    /// `verifying` to `verified`; a mismatch leaves the status alone.
    ///
    /// The lookup runs without the row lock. The outcome is applied to the row
    /// as it stands afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ChallengeNotIssued`] for pending domains,
    /// [`DomainError::InvalidTransition`] for domains in `error`, and
    /// [`DomainError::Dns`] if the lookup fails (after recording the check).
    pub async fn check_challenge(&self, name: &str) -> Result<ChallengeCheck, DomainError> {
        let name = normalize_domain_name(name)?;
        let snapshot = self.load(&name).await?;
        Self::ensure_checkable(&snapshot)?;

        let record_name = snapshot.challenge_record_name();
        let lookup = self.dns.lookup_txt(&record_name).await;

        let _guard = self.row_locks.lock(&name).await;
        let mut domain = self.load(&name).await?;
        Self::ensure_checkable(&domain)?;
        domain.verification_checked_at = Some(Utc::now());

        let values = match lookup {
            Ok(values) => values,
            Err(e) => {
                warn!(domain = %domain.name, error = %e, "Challenge lookup failed");
                metrics::record_verification_check("error");
                self.save(domain).await?;
                return Err(e.into());
            }
        };

        let matched = values.iter().any(|v| *v == domain.verification_token);
        if matched {
            metrics::record_verification_check("matched");
            if domain.status == DomainStatus::Verifying {
                domain.transition(DomainStatus::Verified)?;
                info!(domain = %domain.name, "Domain verified");
            }
        } else {
            metrics::record_verification_check("mismatch");
            debug!(
                domain = %domain.name,
                record = %record_name,
                found = values.len(),
                "Challenge token not found yet"
            );
        }

        let domain = self.save(domain).await?;
        Ok(ChallengeCheck { matched, domain })
    }

    fn ensure_checkable(domain: &Domain) -> Result<(), DomainError> {
        match domain.status {
            DomainStatus::Pending => Err(DomainError::ChallengeNotIssued {
                name: domain.name.clone(),
            }),
            DomainStatus::Error => Err(DomainError::InvalidTransition {
                name: domain.name.clone(),
                from: DomainStatus::Error,
                to: DomainStatus::Verified,
            }),
            _ => Ok(()),
        }
    }

    /// Publish the challenge TXT record, and a CNAME to the edge host for
    /// non-apex names, through the domain's DNS provider.
    ///
    /// Records are ensured, so repeated calls create nothing new. The status is
    /// not changed.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ZoneUnknown`] before zone detection,
    /// [`DomainError::MissingCredentials`] if the provider has no client, and
    /// [`DomainError::Provider`] if the provider API fails.
    pub async fn auto_configure(&self, name: &str) -> Result<AutoConfigured, DomainError> {
        let name = normalize_domain_name(name)?;
        let _guard = self.row_locks.lock(&name).await;
        let domain = self.load(&name).await?;

        let (Some(provider), Some(zone_id)) = (&domain.provider, &domain.zone_id) else {
            return Err(DomainError::ZoneUnknown { name: domain.name });
        };
        let client = self
            .providers
            .get(provider)
            .ok_or_else(|| DomainError::MissingCredentials {
                name: domain.name.clone(),
                provider: provider.clone(),
            })?;

        let txt_record_id = client
            .ensure_txt(
                zone_id,
                &domain.challenge_record_name(),
                &domain.verification_token,
            )
            .await?;

        let cname_record_id = if domain.is_apex() {
            None
        } else {
            Some(
                client
                    .ensure_record(zone_id, "CNAME", &domain.name, &self.edge_host, false)
                    .await?,
            )
        };

        info!(
            domain = %domain.name,
            provider = %provider,
            txt_record_id = %txt_record_id,
            cname_record_id = ?cname_record_id,
            "Domain records configured"
        );
        Ok(AutoConfigured {
            txt_record_id,
            cname_record_id,
        })
    }

    /// Move a verified domain with an issued certificate to `active`.
    ///
    /// Already active domains are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotVerified`] unless the domain is `verified`, and
    /// [`DomainError::CertificateMissing`] if no issued certificate is attached.
    /// Nothing is mutated on rejection.
    pub async fn activate(&self, name: &str) -> Result<Domain, DomainError> {
        let name = normalize_domain_name(name)?;
        let _guard = self.row_locks.lock(&name).await;
        let mut domain = self.load(&name).await?;

        match domain.status {
            DomainStatus::Active => return Ok(domain),
            DomainStatus::Verified => {}
            status => {
                return Err(DomainError::NotVerified {
                    name: domain.name,
                    status,
                });
            }
        }

        let Some(certificate_id) = domain.certificate_id else {
            return Err(DomainError::CertificateMissing { name: domain.name });
        };
        let certificate = match self.store.get_certificate(certificate_id).await {
            Ok(certificate) => certificate,
            Err(StoreError::NotFound { .. }) => {
                return Err(DomainError::CertificateMissing { name: domain.name });
            }
            Err(e) => return Err(e.into()),
        };
        if !certificate.status.is_servable() || certificate.domain != domain.name {
            return Err(DomainError::CertificateMissing { name: domain.name });
        }

        domain.transition(DomainStatus::Active)?;
        let domain = self.save(domain).await?;
        info!(domain = %domain.name, certificate_id = %certificate_id, "Domain activated");
        Ok(domain)
    }

    /// Park a domain in `error`, recording the reason.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] if the domain is not registered.
    pub async fn mark_error(&self, name: &str, reason: &str) -> Result<Domain, DomainError> {
        let name = normalize_domain_name(name)?;
        let _guard = self.row_locks.lock(&name).await;
        let mut domain = self.load(&name).await?;

        domain.transition(DomainStatus::Error)?;
        domain.last_error = Some(reason.to_string());
        domain.updated_at = Utc::now();
        let domain = self.save(domain).await?;
        warn!(domain = %domain.name, reason = %reason, "Domain marked as error");
        Ok(domain)
    }

    /// Return a domain in `error` to `pending`. The token is kept.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] for domains that are neither
    /// in `error` nor already `pending`.
    pub async fn reset(&self, name: &str) -> Result<Domain, DomainError> {
        let name = normalize_domain_name(name)?;
        let _guard = self.row_locks.lock(&name).await;
        let mut domain = self.load(&name).await?;

        if domain.status == DomainStatus::Pending {
            return Ok(domain);
        }
        domain.transition(DomainStatus::Pending)?;
        domain.last_error = None;
        let domain = self.save(domain).await?;
        info!(domain = %domain.name, "Domain reset to pending");
        Ok(domain)
    }
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod domain_tests;
