// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persistence collaborator for domains, certificates and routes.
//!
//! The provisioning core never owns a database. It talks to persistence through
//! the [`Store`] trait, whose row-update semantics are provided by the embedding
//! platform. [`MemoryStore`] is the in-process implementation used by the daemon
//! and by tests.
//!
//! Read-modify-write sequences on a single domain are serialized by the callers
//! through [`crate::locks::KeyedLocks`]; the store itself only guarantees that
//! every call is atomic and that [`Store::snapshot`] is consistent.

use crate::errors::StoreError;
use crate::models::{Certificate, Domain, DomainStatus, Route};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Consistent view of everything the proxy configuration is built from.
#[derive(Clone, Debug, Default)]
pub struct RoutingSnapshot {
    pub routes: Vec<Route>,
    pub certificates: Vec<Certificate>,
}

impl RoutingSnapshot {
    /// Look up a certificate in the snapshot.
    #[must_use]
    pub fn certificate(&self, id: Uuid) -> Option<&Certificate> {
        self.certificates.iter().find(|c| c.id == id)
    }
}

/// Row-level persistence for the provisioning core.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new domain. Names are unique.
    async fn insert_domain(&self, domain: Domain) -> Result<Domain, StoreError>;

    /// Fetch a domain by name.
    async fn get_domain(&self, name: &str) -> Result<Domain, StoreError>;

    /// List domains, optionally filtered by status, ordered by name.
    async fn list_domains(&self, status: Option<DomainStatus>) -> Result<Vec<Domain>, StoreError>;

    /// Replace an existing domain row.
    async fn update_domain(&self, domain: Domain) -> Result<Domain, StoreError>;

    /// Delete a domain by name.
    async fn delete_domain(&self, name: &str) -> Result<(), StoreError>;

    /// Insert a new certificate.
    async fn insert_certificate(&self, certificate: Certificate) -> Result<Certificate, StoreError>;

    /// Replace an existing certificate row.
    async fn update_certificate(&self, certificate: Certificate) -> Result<Certificate, StoreError>;

    /// Fetch a certificate by id.
    async fn get_certificate(&self, id: Uuid) -> Result<Certificate, StoreError>;

    /// List certificates ordered by domain, then creation time.
    async fn list_certificates(&self) -> Result<Vec<Certificate>, StoreError>;

    /// The most recent non-failed certificate of a domain, if any.
    async fn current_certificate(&self, domain: &str) -> Result<Option<Certificate>, StoreError>;

    /// Insert a new route.
    async fn insert_route(&self, route: Route) -> Result<Route, StoreError>;

    /// Replace an existing route row.
    async fn update_route(&self, route: Route) -> Result<Route, StoreError>;

    /// Fetch a route by id.
    async fn get_route(&self, id: Uuid) -> Result<Route, StoreError>;

    /// List routes ordered by domain, then path.
    async fn list_routes(&self) -> Result<Vec<Route>, StoreError>;

    /// Delete a route by id.
    async fn delete_route(&self, id: Uuid) -> Result<(), StoreError>;

    /// Routes and certificates read under one consistent view.
    async fn snapshot(&self) -> Result<RoutingSnapshot, StoreError>;
}

#[derive(Default)]
struct Tables {
    domains: HashMap<String, Domain>,
    certificates: HashMap<Uuid, Certificate>,
    routes: HashMap<Uuid, Route>,
}

/// In-memory [`Store`] backed by a single `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: &'static str, key: impl ToString) -> StoreError {
    StoreError::NotFound {
        kind,
        key: key.to_string(),
    }
}

fn sorted_certificates<'a>(certs: impl Iterator<Item = &'a Certificate>) -> Vec<Certificate> {
    let mut certs: Vec<Certificate> = certs.cloned().collect();
    certs.sort_by(|a, b| {
        a.domain
            .cmp(&b.domain)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    certs
}

fn sorted_routes<'a>(routes: impl Iterator<Item = &'a Route>) -> Vec<Route> {
    let mut routes: Vec<Route> = routes.cloned().collect();
    routes.sort_by(|a, b| {
        a.domain
            .cmp(&b.domain)
            .then(a.path.cmp(&b.path))
            .then(a.id.cmp(&b.id))
    });
    routes
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_domain(&self, domain: Domain) -> Result<Domain, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.domains.contains_key(&domain.name) {
            return Err(StoreError::Conflict {
                kind: "domain",
                key: domain.name,
            });
        }
        tables.domains.insert(domain.name.clone(), domain.clone());
        Ok(domain)
    }

    async fn get_domain(&self, name: &str) -> Result<Domain, StoreError> {
        self.tables
            .read()
            .await
            .domains
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("domain", name))
    }

    async fn list_domains(&self, status: Option<DomainStatus>) -> Result<Vec<Domain>, StoreError> {
        let tables = self.tables.read().await;
        let mut domains: Vec<Domain> = tables
            .domains
            .values()
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(domains)
    }

    async fn update_domain(&self, domain: Domain) -> Result<Domain, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.domains.get_mut(&domain.name) {
            Some(row) if row.id == domain.id => {
                *row = domain.clone();
                Ok(domain)
            }
            _ => Err(not_found("domain", &domain.name)),
        }
    }

    async fn delete_domain(&self, name: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .domains
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("domain", name))
    }

    async fn insert_certificate(&self, certificate: Certificate) -> Result<Certificate, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.certificates.contains_key(&certificate.id) {
            return Err(StoreError::Conflict {
                kind: "certificate",
                key: certificate.id.to_string(),
            });
        }
        tables
            .certificates
            .insert(certificate.id, certificate.clone());
        Ok(certificate)
    }

    async fn update_certificate(&self, certificate: Certificate) -> Result<Certificate, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.certificates.get_mut(&certificate.id) {
            Some(row) => {
                *row = certificate.clone();
                Ok(certificate)
            }
            None => Err(not_found("certificate", certificate.id)),
        }
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Certificate, StoreError> {
        self.tables
            .read()
            .await
            .certificates
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("certificate", id))
    }

    async fn list_certificates(&self) -> Result<Vec<Certificate>, StoreError> {
        let tables = self.tables.read().await;
        Ok(sorted_certificates(tables.certificates.values()))
    }

    async fn current_certificate(&self, domain: &str) -> Result<Option<Certificate>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .filter(|c| c.domain == domain && c.status.is_current())
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn insert_route(&self, route: Route) -> Result<Route, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .routes
            .values()
            .any(|r| r.domain == route.domain && r.path == route.path)
        {
            return Err(StoreError::Conflict {
                kind: "route",
                key: format!("{}{}", route.domain, route.path),
            });
        }
        tables.routes.insert(route.id, route.clone());
        Ok(route)
    }

    async fn update_route(&self, route: Route) -> Result<Route, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.routes.get_mut(&route.id) {
            Some(row) => {
                *row = route.clone();
                Ok(route)
            }
            None => Err(not_found("route", route.id)),
        }
    }

    async fn get_route(&self, id: Uuid) -> Result<Route, StoreError> {
        self.tables
            .read()
            .await
            .routes
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("route", id))
    }

    async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        let tables = self.tables.read().await;
        Ok(sorted_routes(tables.routes.values()))
    }

    async fn delete_route(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .routes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("route", id))
    }

    async fn snapshot(&self) -> Result<RoutingSnapshot, StoreError> {
        let tables = self.tables.read().await;
        Ok(RoutingSnapshot {
            routes: sorted_routes(tables.routes.values()),
            certificates: sorted_certificates(tables.certificates.values()),
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
