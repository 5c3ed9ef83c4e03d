// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Route creation and deletion.
//!
//! Creating a route validates it synchronously, registers its domain when
//! missing, stores it, and returns at once. The proxy reconcile runs detached,
//! and provisioning starts in the background when the request asks for domain
//! verification or certificate issuance.

use crate::errors::{DomainError, RouteError, StoreError};
use crate::metrics;
use crate::models::{normalize_domain_name, Certificate, ProvisioningProgress, Route};
use crate::reconcilers::domain::DomainVerifier;
use crate::reconcilers::pipeline::{PipelineOptions, ProvisioningPipeline};
use crate::reconcilers::proxy::ProxyReconciler;
use crate::store::Store;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest accepted route path
const MAX_PATH_LENGTH: usize = 1024;

/// Longest accepted service id
const MAX_SERVICE_ID_LENGTH: usize = 253;

/// Request to expose a service under `domain + path`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub service_id: String,
    pub domain: String,
    /// Upstream port; wider than `u16` so out-of-range input is reported
    pub port: u32,
    pub path: String,
    pub tls: bool,
    pub certificate_id: Option<Uuid>,
    #[serde(default)]
    pub auto_verify_domain: bool,
    #[serde(default)]
    pub auto_issue_cert: bool,
    /// ACME contact for auto-issued certificates
    pub email: Option<String>,
}

/// Result of [`RouteService::create_route`].
#[derive(Clone, Debug, PartialEq)]
pub struct RouteCreated {
    pub route: Route,
    /// Set when provisioning was requested
    pub progress: Option<ProvisioningProgress>,
}

/// Check an upstream port.
///
/// # Errors
///
/// Returns [`RouteError::InvalidPort`] outside 1..=65535.
pub fn validate_port(port: u32) -> Result<u16, RouteError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(RouteError::InvalidPort { port })
}

/// Check a route path. Paths are interpolated into the proxy configuration,
/// so characters with meaning there are rejected.
///
/// # Errors
///
/// Returns [`RouteError::InvalidPath`] describing the problem.
pub fn validate_path(path: &str) -> Result<(), RouteError> {
    let invalid = |reason: &str| RouteError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path.len() > MAX_PATH_LENGTH {
        return Err(invalid("too long"));
    }
    if let Some(c) = path
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '{' | '}' | ';' | '"' | '\'' | '#'))
    {
        return Err(invalid(&format!("contains forbidden character {c:?}")));
    }
    Ok(())
}

/// Check a service id, which becomes an upstream host name.
///
/// # Errors
///
/// Returns [`RouteError::InvalidService`] for empty or malformed ids.
pub fn validate_service_id(service_id: &str) -> Result<(), RouteError> {
    let valid = !service_id.is_empty()
        && service_id.len() <= MAX_SERVICE_ID_LENGTH
        && service_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RouteError::InvalidService {
            service_id: service_id.to_string(),
        })
    }
}

/// Point every TLS route of `domain` at `certificate`.
///
/// Returns the number of routes updated.
///
/// # Errors
///
/// Returns [`StoreError`] if routes cannot be listed or updated.
pub async fn attach_certificate(
    store: &dyn Store,
    domain: &str,
    certificate: &Certificate,
) -> Result<usize, StoreError> {
    let mut attached = 0;
    for mut route in store.list_routes().await? {
        if route.domain == domain && route.tls && route.certificate_id != Some(certificate.id) {
            route.certificate_id = Some(certificate.id);
            store.update_route(route).await?;
            attached += 1;
        }
    }
    if attached > 0 {
        info!(
            domain = %domain,
            certificate_id = %certificate.id,
            routes = attached,
            "Certificate attached to routes"
        );
    }
    Ok(attached)
}

/// Creates and deletes routes.
pub struct RouteService {
    store: Arc<dyn Store>,
    domains: Arc<DomainVerifier>,
    reconciler: Arc<ProxyReconciler>,
    pipeline: Arc<ProvisioningPipeline>,
}

impl RouteService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        domains: Arc<DomainVerifier>,
        reconciler: Arc<ProxyReconciler>,
        pipeline: Arc<ProvisioningPipeline>,
    ) -> Self {
        Self {
            store,
            domains,
            reconciler,
            pipeline,
        }
    }

    /// Check an explicit certificate reference.
    async fn check_certificate(&self, id: Uuid, domain: &str) -> Result<(), RouteError> {
        let certificate = match self.store.get_certificate(id).await {
            Ok(certificate) => certificate,
            Err(StoreError::NotFound { .. }) => return Err(RouteError::CertificateNotFound { id }),
            Err(e) => return Err(e.into()),
        };
        if !certificate.status.is_servable() {
            return Err(RouteError::CertificateNotIssued {
                id,
                status: certificate.status,
            });
        }
        if certificate.domain != domain {
            return Err(RouteError::CertificateDomainMismatch {
                id,
                certificate_domain: certificate.domain,
                domain: domain.to_string(),
            });
        }
        Ok(())
    }

    fn spawn_reconcile(&self) {
        let reconciler = Arc::clone(&self.reconciler);
        tokio::spawn(async move {
            if let Err(e) = reconciler.reconcile().await {
                warn!(error = %e, "Reconcile after route change failed");
            }
        });
    }

    /// Validate and store a route.
    ///
    /// Returns immediately; the reconcile and any provisioning run in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] describing the first invalid field, or
    /// [`RouteError::Conflict`] if the domain and path are taken. Nothing is
    /// stored on rejection.
    pub async fn create_route(&self, request: RouteRequest) -> Result<RouteCreated, RouteError> {
        let port = validate_port(request.port)?;
        validate_path(&request.path)?;
        validate_service_id(&request.service_id)?;
        let domain = normalize_domain_name(&request.domain)?;

        let mut certificate_id = request.certificate_id;
        if let Some(id) = certificate_id {
            if !request.tls {
                return Err(RouteError::CertificateWithoutTls { domain });
            }
            self.check_certificate(id, &domain).await?;
        } else if request.tls {
            // Reuse a certificate the domain already serves
            certificate_id = self
                .store
                .current_certificate(&domain)
                .await?
                .filter(|c| c.status.is_servable())
                .map(|c| c.id);
        }

        match self.domains.create(&domain).await {
            Ok(_) | Err(DomainError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let route = Route {
            id: Uuid::new_v4(),
            service_id: request.service_id,
            domain: domain.clone(),
            port,
            path: request.path.clone(),
            tls: request.tls,
            certificate_id,
            created_at: Utc::now(),
        };
        let route = match self.store.insert_route(route).await {
            Ok(route) => route,
            Err(StoreError::Conflict { .. }) => {
                return Err(RouteError::Conflict {
                    domain,
                    path: request.path,
                });
            }
            Err(e) => return Err(e.into()),
        };
        metrics::record_object_created("route");
        info!(
            route_id = %route.id,
            domain = %route.domain,
            path = %route.path,
            service_id = %route.service_id,
            tls = route.tls,
            "Route created"
        );

        self.spawn_reconcile();

        let options = PipelineOptions {
            auto_verify: request.auto_verify_domain,
            auto_issue: request.auto_issue_cert,
            email: request.email,
        };
        let progress = if options.is_requested() {
            Some(self.pipeline.start(&route.domain, Some(route.id), options))
        } else {
            debug!(route_id = %route.id, "No provisioning requested");
            None
        };

        Ok(RouteCreated { route, progress })
    }

    /// Fetch a route.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NotFound`] if the route does not exist.
    pub async fn get_route(&self, id: Uuid) -> Result<Route, RouteError> {
        match self.store.get_route(id).await {
            Ok(route) => Ok(route),
            Err(StoreError::NotFound { .. }) => Err(RouteError::NotFound { id }),
            Err(e) => Err(e.into()),
        }
    }

    /// All routes, ordered by domain and path.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Store`] if the store is unavailable.
    pub async fn list_routes(&self) -> Result<Vec<Route>, RouteError> {
        Ok(self.store.list_routes().await?)
    }

    /// Delete a route and reconcile the proxy in the background.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NotFound`] if the route does not exist.
    pub async fn delete_route(&self, id: Uuid) -> Result<(), RouteError> {
        match self.store.delete_route(id).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => return Err(RouteError::NotFound { id }),
            Err(e) => return Err(e.into()),
        }
        self.pipeline.board().forget_route(id);
        metrics::record_object_deleted("route");
        info!(route_id = %id, "Route deleted");
        self.spawn_reconcile();
        Ok(())
    }
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod routes_tests;
