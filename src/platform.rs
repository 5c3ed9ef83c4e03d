// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operations exposed to the API layer.
//!
//! [`Platform`] bundles the reconcilers behind one handle. Domain responses are
//! wrapped in a [`DomainView`] that adds the next action and the DNS records
//! the user must publish, both computed from the status alone.

use crate::errors::{CertificateError, DomainError, ProxyError, RouteError};
use crate::models::{
    Certificate, Challenge, DnsInstruction, Domain, DomainStatus, NextAction,
    ProvisioningProgress, Route,
};
use crate::reconcilers::certificate::CertificateManager;
use crate::reconcilers::domain::{AutoConfigured, DomainVerifier};
use crate::reconcilers::pipeline::ProvisioningPipeline;
use crate::reconcilers::proxy::{ProxyReconciler, ReconcileReport};
use crate::reconcilers::routes::{attach_certificate, RouteCreated, RouteRequest, RouteService};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A domain plus UI hints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainView {
    #[serde(flatten)]
    pub domain: Domain,
    pub next_action: NextAction,
    pub dns_instructions: Vec<DnsInstruction>,
}

impl DomainView {
    #[must_use]
    pub fn new(domain: Domain, edge_host: &str) -> Self {
        Self {
            next_action: domain.next_action(),
            dns_instructions: domain.dns_instructions(edge_host),
            domain,
        }
    }
}

/// Result of a verification request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub matched: bool,
    pub domain: DomainView,
}

/// Handle over every provisioning component.
pub struct Platform {
    store: Arc<dyn Store>,
    domains: Arc<DomainVerifier>,
    certificates: Arc<CertificateManager>,
    reconciler: Arc<ProxyReconciler>,
    pipeline: Arc<ProvisioningPipeline>,
    routes: RouteService,
}

impl Platform {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        domains: Arc<DomainVerifier>,
        certificates: Arc<CertificateManager>,
        reconciler: Arc<ProxyReconciler>,
        pipeline: Arc<ProvisioningPipeline>,
    ) -> Self {
        let routes = RouteService::new(
            store.clone(),
            domains.clone(),
            reconciler.clone(),
            pipeline.clone(),
        );
        Self {
            store,
            domains,
            certificates,
            reconciler,
            pipeline,
            routes,
        }
    }

    fn view(&self, domain: Domain) -> DomainView {
        DomainView::new(domain, self.domains.edge_host())
    }

    /// Reconcile after a certificate change; failures are left to the next run.
    async fn reconcile_after(&self, domain: &str) {
        if let Err(e) = self.reconciler.reconcile().await {
            warn!(domain = %domain, error = %e, "Reconcile after certificate change failed");
        }
    }

    // ========================================================================
    // Domains
    // ========================================================================

    /// # Errors
    ///
    /// See [`DomainVerifier::create`].
    pub async fn create_domain(&self, name: &str) -> Result<DomainView, DomainError> {
        let domain = self.domains.create(name).await?;
        Ok(self.view(domain))
    }

    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] for unknown names.
    pub async fn get_domain(&self, name: &str) -> Result<DomainView, DomainError> {
        let domain = self.domains.get(name).await?;
        Ok(self.view(domain))
    }

    /// # Errors
    ///
    /// Returns [`DomainError::Store`] if the store is unavailable.
    pub async fn list_domains(
        &self,
        status: Option<DomainStatus>,
    ) -> Result<Vec<DomainView>, DomainError> {
        let domains = self.domains.list(status).await?;
        Ok(domains.into_iter().map(|d| self.view(d)).collect())
    }

    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] for unknown names.
    pub async fn delete_domain(&self, name: &str) -> Result<(), DomainError> {
        self.domains.delete(name).await
    }

    /// # Errors
    ///
    /// See [`DomainVerifier::issue_challenge`].
    pub async fn issue_challenge(&self, name: &str) -> Result<Challenge, DomainError> {
        self.domains.issue_challenge(name).await
    }

    /// Check the challenge once, issuing it first for a pending domain.
    ///
    /// # Errors
    ///
    /// See [`DomainVerifier::check_challenge`].
    pub async fn verify_domain(&self, name: &str) -> Result<Verification, DomainError> {
        let current = self.domains.get(name).await?;
        if current.status == DomainStatus::Pending {
            self.domains.issue_challenge(&current.name).await?;
        }
        let check = self.domains.check_challenge(&current.name).await?;
        Ok(Verification {
            matched: check.matched,
            domain: self.view(check.domain),
        })
    }

    /// Publish the challenge (and edge CNAME) through the DNS provider,
    /// detecting the zone first when it is unknown.
    ///
    /// # Errors
    ///
    /// See [`DomainVerifier::detect_zone`] and [`DomainVerifier::auto_configure`].
    pub async fn auto_configure(&self, name: &str) -> Result<AutoConfigured, DomainError> {
        let current = self.domains.get(name).await?;
        if current.zone_id.is_none() {
            debug!(domain = %current.name, "Zone unknown, detecting before auto-configuration");
            self.domains.detect_zone(&current.name).await?;
        }
        self.domains.auto_configure(&current.name).await
    }

    /// # Errors
    ///
    /// See [`DomainVerifier::activate`].
    pub async fn activate_domain(&self, name: &str) -> Result<DomainView, DomainError> {
        let domain = self.domains.activate(name).await?;
        Ok(self.view(domain))
    }

    /// # Errors
    ///
    /// See [`DomainVerifier::mark_error`].
    pub async fn mark_domain_error(
        &self,
        name: &str,
        reason: &str,
    ) -> Result<DomainView, DomainError> {
        let domain = self.domains.mark_error(name, reason).await?;
        Ok(self.view(domain))
    }

    /// # Errors
    ///
    /// See [`DomainVerifier::reset`].
    pub async fn reset_domain(&self, name: &str) -> Result<DomainView, DomainError> {
        let domain = self.domains.reset(name).await?;
        Ok(self.view(domain))
    }

    // ========================================================================
    // Certificates
    // ========================================================================

    /// Issue a certificate, attach it to the domain's TLS routes and reconcile.
    ///
    /// # Errors
    ///
    /// See [`CertificateManager::issue`].
    pub async fn issue_certificate(
        &self,
        domain: &str,
        email: &str,
    ) -> Result<Certificate, CertificateError> {
        let certificate = self.certificates.issue(domain, email).await?;
        attach_certificate(self.store.as_ref(), &certificate.domain, &certificate).await?;
        self.reconcile_after(&certificate.domain).await;
        Ok(certificate)
    }

    /// Renew a certificate and reconcile so the new files are served.
    ///
    /// # Errors
    ///
    /// See [`CertificateManager::renew`].
    pub async fn renew_certificate(&self, domain: &str) -> Result<Certificate, CertificateError> {
        let certificate = self.certificates.renew(domain).await?;
        self.reconcile_after(&certificate.domain).await;
        Ok(certificate)
    }

    /// # Errors
    ///
    /// Returns [`CertificateError::NoCertificate`] if the domain has none.
    pub async fn certificate_for_domain(
        &self,
        domain: &str,
    ) -> Result<Certificate, CertificateError> {
        self.certificates.get_by_domain(domain).await
    }

    /// # Errors
    ///
    /// Returns [`CertificateError::Store`] if the store is unavailable.
    pub async fn list_certificates(&self) -> Result<Vec<Certificate>, CertificateError> {
        self.certificates.list().await
    }

    /// # Errors
    ///
    /// Returns [`CertificateError::Store`] if the store is unavailable.
    pub async fn list_expiring_soon(
        &self,
        within: chrono::Duration,
    ) -> Result<Vec<Certificate>, CertificateError> {
        self.certificates.list_expiring_soon(within).await
    }

    // ========================================================================
    // Routes and provisioning
    // ========================================================================

    /// # Errors
    ///
    /// See [`RouteService::create_route`].
    pub async fn create_route(&self, request: RouteRequest) -> Result<RouteCreated, RouteError> {
        self.routes.create_route(request).await
    }

    /// # Errors
    ///
    /// Returns [`RouteError::NotFound`] for unknown ids.
    pub async fn get_route(&self, id: Uuid) -> Result<Route, RouteError> {
        self.routes.get_route(id).await
    }

    /// # Errors
    ///
    /// Returns [`RouteError::Store`] if the store is unavailable.
    pub async fn list_routes(&self) -> Result<Vec<Route>, RouteError> {
        self.routes.list_routes().await
    }

    /// # Errors
    ///
    /// Returns [`RouteError::NotFound`] for unknown ids.
    pub async fn delete_route(&self, id: Uuid) -> Result<(), RouteError> {
        self.routes.delete_route(id).await
    }

    #[must_use]
    pub fn provisioning(&self, domain: &str) -> Option<ProvisioningProgress> {
        self.pipeline.progress(domain)
    }

    #[must_use]
    pub fn provisioning_for_route(&self, route_id: Uuid) -> Option<ProvisioningProgress> {
        self.pipeline.progress_for_route(route_id)
    }

    /// Rebuild and apply the proxy configuration now.
    ///
    /// # Errors
    ///
    /// See [`ProxyReconciler::reconcile`].
    pub async fn reconcile(&self) -> Result<ReconcileReport, ProxyError> {
        self.reconciler.reconcile().await
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod platform_tests;
