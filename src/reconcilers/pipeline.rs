// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provisioning pipeline.
//!
//! Sequences domain verification, certificate issuance and proxy reload for one
//! domain on a detached task, publishing a [`ProvisioningProgress`] record that
//! callers poll by domain or route id.
//!
//! # Stages
//!
//! ```text
//! verification ──▶ certificate_issuance ──▶ proxy_reload ──▶ complete
//!       │                   │
//!       └─────── error ◀────┘
//! ```
//!
//! 1. With `auto_verify`, the challenge is issued (and published through the
//!    provider when the zone is managed), then checked up to
//!    `verification_attempts` times, attempt *i* waiting *i* × `backoff_step`.
//!    Without it the domain is assumed verified through manual DNS.
//! 2. With `auto_issue`, a certificate is issued and attached to every TLS
//!    route of the domain.
//! 3. After issuance the proxy is reconciled and the domain activated. A reload
//!    failure is reported in the message; the run still completes because the
//!    stored state is correct and the next reconcile applies it.
//!
//! Only one run per domain is active at a time. Starting a run for a domain
//! with an active run returns that run's progress instead.
//!
//! Runs are never cancelled. Every step re-reads the domain, so deleting it
//! ends the run in error at the next step.

use crate::errors::{DomainError, ProxyError};
use crate::metrics;
use crate::models::{normalize_domain_name, ProvisioningProgress, ProvisioningStage};
use crate::reconcilers::certificate::CertificateManager;
use crate::reconcilers::domain::DomainVerifier;
use crate::reconcilers::proxy::ProxyReconciler;
use crate::reconcilers::retry::verification_delay;
use crate::reconcilers::routes::attach_certificate;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What a pipeline run should do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub auto_verify: bool,
    pub auto_issue: bool,
    /// ACME contact; falls back to the configured default
    pub email: Option<String>,
}

impl PipelineOptions {
    /// Whether the options ask for any work at all.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.auto_verify || self.auto_issue
    }
}

/// Pipeline tuning.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub verification_attempts: u32,
    pub backoff_step: Duration,
    pub default_email: Option<String>,
}

#[derive(Default)]
struct BoardState {
    by_domain: HashMap<String, ProvisioningProgress>,
    route_domains: HashMap<Uuid, String>,
}

/// Progress records keyed by domain, also reachable by route id.
///
/// The last finished record of a domain stays readable until the next run for
/// that domain replaces it.
#[derive(Default)]
pub struct ProgressBoard {
    state: Mutex<BoardState>,
}

/// Outcome of claiming a domain on the board.
enum Begin {
    Started(ProvisioningProgress),
    Joined(ProvisioningProgress),
}

impl ProgressBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BoardState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claim the domain for a new run, or join the active one.
    fn begin(&self, domain: &str, route_id: Option<Uuid>) -> Begin {
        let mut state = self.state();
        if let Some(route_id) = route_id {
            state.route_domains.insert(route_id, domain.to_string());
        }
        if let Some(active) = state.by_domain.get(domain).filter(|p| !p.finished) {
            return Begin::Joined(active.clone());
        }
        let progress = ProvisioningProgress::new(domain, route_id);
        state
            .by_domain
            .insert(domain.to_string(), progress.clone());
        Begin::Started(progress)
    }

    /// Apply `f` to the domain's record and return the result.
    fn update(
        &self,
        domain: &str,
        f: impl FnOnce(&mut ProvisioningProgress),
    ) -> Option<ProvisioningProgress> {
        let mut state = self.state();
        let progress = state.by_domain.get_mut(domain)?;
        f(progress);
        Some(progress.clone())
    }

    /// Latest progress of a domain.
    #[must_use]
    pub fn get_by_domain(&self, domain: &str) -> Option<ProvisioningProgress> {
        self.state().by_domain.get(domain).cloned()
    }

    /// Latest progress of the domain a route belongs to.
    #[must_use]
    pub fn get_by_route(&self, route_id: Uuid) -> Option<ProvisioningProgress> {
        let state = self.state();
        let domain = state.route_domains.get(&route_id)?;
        state.by_domain.get(domain).cloned()
    }

    /// Forget a deleted route.
    pub fn forget_route(&self, route_id: Uuid) {
        self.state().route_domains.remove(&route_id);
    }

    /// Number of runs still in flight.
    #[must_use]
    pub fn active_runs(&self) -> usize {
        self.state()
            .by_domain
            .values()
            .filter(|p| !p.finished)
            .count()
    }
}

/// Runs provisioning in the background.
pub struct ProvisioningPipeline {
    store: Arc<dyn Store>,
    domains: Arc<DomainVerifier>,
    certificates: Arc<CertificateManager>,
    reconciler: Arc<ProxyReconciler>,
    board: Arc<ProgressBoard>,
    settings: PipelineSettings,
}

impl ProvisioningPipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        domains: Arc<DomainVerifier>,
        certificates: Arc<CertificateManager>,
        reconciler: Arc<ProxyReconciler>,
        board: Arc<ProgressBoard>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            domains,
            certificates,
            reconciler,
            board,
            settings,
        }
    }

    /// Shared progress board.
    #[must_use]
    pub fn board(&self) -> &Arc<ProgressBoard> {
        &self.board
    }

    /// Start a detached run for `domain`, or join the active one.
    ///
    /// Returns immediately with the progress snapshot to poll.
    pub fn start(
        self: &Arc<Self>,
        domain: &str,
        route_id: Option<Uuid>,
        options: PipelineOptions,
    ) -> ProvisioningProgress {
        let domain = normalize_domain_name(domain).unwrap_or_else(|_| domain.to_string());
        match self.board.begin(&domain, route_id) {
            Begin::Joined(progress) => {
                info!(
                    domain = %domain,
                    route_id = ?route_id,
                    "Provisioning already running, joining"
                );
                progress
            }
            Begin::Started(progress) => {
                info!(
                    domain = %domain,
                    route_id = ?route_id,
                    auto_verify = options.auto_verify,
                    auto_issue = options.auto_issue,
                    "Provisioning scheduled"
                );
                let pipeline = Arc::clone(self);
                tokio::spawn(async move {
                    pipeline.run(&domain, &options).await;
                });
                progress
            }
        }
    }

    /// Latest progress of a domain.
    #[must_use]
    pub fn progress(&self, domain: &str) -> Option<ProvisioningProgress> {
        let domain = normalize_domain_name(domain).unwrap_or_else(|_| domain.to_string());
        self.board.get_by_domain(&domain)
    }

    /// Latest progress of the domain a route belongs to.
    #[must_use]
    pub fn progress_for_route(&self, route_id: Uuid) -> Option<ProvisioningProgress> {
        self.board.get_by_route(route_id)
    }

    fn step(&self, domain: &str, stage: ProvisioningStage, message: impl Into<String>) {
        let message = message.into();
        debug!(domain = %domain, stage = %stage, message = %message, "Provisioning step");
        self.board.update(domain, |p| p.update(stage, message));
    }

    fn fail(&self, domain: &str, error: impl Into<String>) -> Option<ProvisioningProgress> {
        let error = error.into();
        error!(domain = %domain, error = %error, "Provisioning failed");
        self.board.update(domain, |p| p.fail(error))
    }

    /// Execute a run to completion. The progress record must already exist.
    async fn run(&self, domain: &str, options: &PipelineOptions) {
        let started = Instant::now();
        let Some(progress) = self.execute(domain, options).await else {
            return;
        };
        let outcome = if progress.is_error() { "error" } else { "complete" };
        metrics::record_pipeline_run(outcome, progress.stage.as_str(), started.elapsed());
        info!(
            domain = %domain,
            outcome = outcome,
            stage = %progress.stage,
            elapsed = ?started.elapsed(),
            "Provisioning finished"
        );
    }

    /// Drive the stages and return the run's terminal progress.
    async fn execute(
        &self,
        domain: &str,
        options: &PipelineOptions,
    ) -> Option<ProvisioningProgress> {
        // Verification
        if options.auto_verify {
            self.step(domain, ProvisioningStage::Verification, "Verifying domain ownership");
            if let Err(e) = self.verify(domain).await {
                return self.fail(domain, e);
            }
            self.board.update(domain, |p| p.domain_verified = true);
            self.step(domain, ProvisioningStage::Verification, "Domain verified");
        } else {
            self.board.update(domain, |p| p.domain_verified = true);
            self.step(
                domain,
                ProvisioningStage::Verification,
                "Domain assumed verified (manual DNS)",
            );
        }

        if !options.auto_issue {
            return self
                .board
                .update(domain, |p| p.complete("Domain verified; certificate not requested"));
        }

        // Certificate issuance
        self.step(domain, ProvisioningStage::CertificateIssuance, "Issuing certificate");
        let email = options
            .email
            .clone()
            .or_else(|| self.settings.default_email.clone())
            .unwrap_or_default();
        let certificate = match self.certificates.issue(domain, &email).await {
            Ok(certificate) => certificate,
            Err(e) => return self.fail(domain, e.to_string()),
        };
        if let Err(e) = attach_certificate(self.store.as_ref(), domain, &certificate).await {
            return self.fail(domain, format!("Failed to attach certificate to routes: {e}"));
        }
        self.board.update(domain, |p| p.certificate_issued = true);
        self.step(
            domain,
            ProvisioningStage::CertificateIssuance,
            format!("Certificate {} issued", certificate.id),
        );

        // Proxy reload
        self.step(domain, ProvisioningStage::ProxyReload, "Reloading proxy");
        let message = match self.reconciler.reconcile().await {
            Ok(report) => {
                self.board.update(domain, |p| p.proxy_reloaded = true);
                match self.domains.activate(domain).await {
                    Ok(_) => format!(
                        "Provisioning complete: {} route(s), {} over HTTPS",
                        report.routes, report.tls_routes
                    ),
                    Err(e) => {
                        warn!(domain = %domain, error = %e, "Domain not activated");
                        format!("Proxy reloaded; domain not activated: {e}")
                    }
                }
            }
            Err(e) => {
                warn!(
                    domain = %domain,
                    error = %e,
                    "Proxy reload failed, leaving it to the next reconcile"
                );
                reload_failure_message(&e)
            }
        };
        self.board.update(domain, |p| p.complete(message))
    }

    /// Issue the challenge and poll until it matches or attempts run out.
    async fn verify(&self, domain: &str) -> Result<(), String> {
        let challenge = self
            .domains
            .issue_challenge(domain)
            .await
            .map_err(|e| e.to_string())?;
        let current = self.domains.get(domain).await.map_err(|e| e.to_string())?;
        if current.status.is_verified() {
            debug!(domain = %domain, "Domain already verified");
            return Ok(());
        }

        self.publish_challenge(domain).await;

        let attempts = self.settings.verification_attempts;
        for attempt in 1..=attempts {
            let delay = verification_delay(attempt, self.settings.backoff_step);
            self.step(
                domain,
                ProvisioningStage::Verification,
                format!(
                    "Waiting {}s for DNS propagation (attempt {attempt}/{attempts})",
                    delay.as_secs()
                ),
            );
            tokio::time::sleep(delay).await;

            match self.domains.check_challenge(domain).await {
                Ok(check) if check.matched => return Ok(()),
                Ok(_) => {
                    debug!(domain = %domain, attempt, "Challenge record not visible yet");
                }
                Err(e) if e.is_transient() => {
                    warn!(domain = %domain, attempt, error = %e, "Challenge check failed, retrying");
                }
                Err(e) => return Err(e.to_string()),
            }
        }

        Err(format!(
            "Domain verification failed after {attempts} attempts: \
             TXT record {} does not contain the verification token",
            challenge.record_name
        ))
    }

    /// Publish the challenge through the provider when the zone allows it.
    async fn publish_challenge(&self, domain: &str) {
        let mut current = match self.domains.get(domain).await {
            Ok(current) => current,
            Err(_) => return,
        };
        if current.zone_id.is_none() {
            match self.domains.detect_zone(domain).await {
                Ok(detected) => current = detected,
                Err(e) => {
                    debug!(domain = %domain, error = %e, "Zone detection failed, expecting manual DNS");
                    return;
                }
            }
        }
        match self.domains.auto_configure(&current.name).await {
            Ok(_) => self.step(
                domain,
                ProvisioningStage::Verification,
                "Challenge record published through DNS provider",
            ),
            Err(DomainError::ZoneUnknown { .. } | DomainError::MissingCredentials { .. }) => {
                debug!(domain = %domain, "Zone not managed, expecting manual DNS");
            }
            Err(e) => warn!(domain = %domain, error = %e, "Auto-configuration failed"),
        }
    }
}

fn reload_failure_message(error: &ProxyError) -> String {
    format!(
        "Certificate issued; proxy reload failed and will be retried by the next reconcile: {error}"
    )
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod pipeline_tests;
