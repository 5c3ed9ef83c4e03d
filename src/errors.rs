// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the provisioning core.
//!
//! This module provides specialized error types for:
//! - The persistence collaborator (row lookups, uniqueness)
//! - DNS inspection (TXT and NS queries through hickory-client)
//! - DNS provider APIs (Cloudflare record management)
//! - The certificate authority (ACME orders and challenges)
//! - The reverse proxy (configuration validation, atomic write, reload)
//! - The domain, certificate and route state machines built on top of them
//!
//! Each type exposes `is_transient()`. Transient errors are expected to clear on
//! their own (DNS propagation, rate limits, an unreachable proxy) and are retried
//! within the pipeline bounds or by a later reconcile. Everything else is a
//! synchronous rejection that must not be retried.

use crate::models::{CertificateStatus, DomainStatus};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the persistence collaborator.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Row not found
    #[error("{kind} '{key}' not found")]
    NotFound {
        /// Row kind (e.g., "domain", "certificate", "route")
        kind: &'static str,
        /// Lookup key (name or id)
        key: String,
    },

    /// A unique constraint was violated
    #[error("{kind} '{key}' already exists")]
    Conflict {
        /// Row kind
        kind: &'static str,
        /// Conflicting key
        key: String,
    },

    /// Backend unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors that can occur while inspecting DNS through a resolver.
#[derive(Error, Debug, Clone)]
pub enum DnsError {
    /// The queried name is not a valid DNS name
    #[error("Invalid DNS name '{name}': {reason}")]
    InvalidName {
        /// The name that failed to parse
        name: String,
        /// Parser error
        reason: String,
    },

    /// A resolver failed to answer
    #[error("DNS query for '{name}' against {server} failed: {reason}")]
    QueryFailed {
        /// The queried name
        name: String,
        /// Resolver address (IP:port)
        server: String,
        /// Specific reason for the failure
        reason: String,
    },

    /// The query exceeded its time bound
    #[error("DNS query for '{name}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The queried name
        name: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// No zone could be found for a domain
    #[error("No authoritative zone found for '{domain}'")]
    ZoneNotFound {
        /// The domain that was walked up to the root
        domain: String,
    },

    /// No resolvers configured
    #[error("No DNS resolvers configured")]
    NoResolvers,
}

impl DnsError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueryFailed { .. } | Self::Timeout { .. })
    }
}

/// Errors returned by DNS provider APIs (e.g., Cloudflare).
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Credentials rejected (HTTP 401/403)
    #[error("Authentication with {provider} failed: {reason}")]
    Authentication {
        /// Provider name
        provider: String,
        /// Reason reported by the provider
        reason: String,
    },

    /// The zone does not exist in the provider account
    #[error("Zone '{zone}' not found at {provider}")]
    ZoneNotFound {
        /// Provider name
        provider: String,
        /// Zone name
        zone: String,
    },

    /// Rate limited (HTTP 429)
    #[error("Rate limited by {provider}")]
    RateLimited {
        /// Provider name
        provider: String,
    },

    /// Provider API unavailable (HTTP 5xx or connection failure)
    #[error("{provider} API at {endpoint} unavailable: {reason}")]
    Unavailable {
        /// Provider name
        provider: String,
        /// Endpoint URL
        endpoint: String,
        /// Reason for the failure
        reason: String,
    },

    /// Request rejected (HTTP 4xx other than auth/429)
    #[error("{provider} rejected request to {endpoint} (HTTP {status}): {reason}")]
    Rejected {
        /// Provider name
        provider: String,
        /// Endpoint URL
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Reason reported by the provider
        reason: String,
    },

    /// Response body could not be interpreted
    #[error("Invalid response from {provider} at {endpoint}: {reason}")]
    InvalidResponse {
        /// Provider name
        provider: String,
        /// Endpoint URL
        endpoint: String,
        /// Parse failure
        reason: String,
    },

    /// Request exceeded its time bound
    #[error("{provider} request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout {
        /// Provider name
        provider: String,
        /// Endpoint URL
        endpoint: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },
}

impl ProviderError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Unavailable { .. } | Self::Timeout { .. }
        )
    }
}

/// Errors raised by the certificate authority client.
#[derive(Error, Debug, Clone)]
pub enum CaError {
    /// ACME account could not be created or loaded
    #[error("ACME account error: {0}")]
    Account(String),

    /// Order creation or refresh failed
    #[error("ACME order for '{domain}' failed: {reason}")]
    Order {
        /// Domain being ordered
        domain: String,
        /// Reason for the failure
        reason: String,
    },

    /// Challenge could not be published or was rejected
    #[error("ACME challenge for '{domain}' failed: {reason}")]
    Challenge {
        /// Domain being validated
        domain: String,
        /// Reason for the failure
        reason: String,
    },

    /// CSR submission or certificate download failed
    #[error("ACME finalization for '{domain}' failed: {reason}")]
    Finalization {
        /// Domain being finalized
        domain: String,
        /// Reason for the failure
        reason: String,
    },

    /// The CA asked us to slow down
    #[error("Certificate authority rate limited issuance for '{domain}'")]
    RateLimited {
        /// Domain being ordered
        domain: String,
    },

    /// Issuance exceeded its time bound
    #[error("Certificate issuance for '{domain}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Domain being ordered
        domain: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Certificate material could not be written or read
    #[error("Certificate storage error at {path}: {reason}")]
    Storage {
        /// File system path
        path: String,
        /// Reason for the failure
        reason: String,
    },

    /// Issued certificate could not be parsed
    #[error("Failed to parse issued certificate: {0}")]
    CertificateParse(String),
}

impl CaError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout { .. })
    }
}

/// Errors raised while validating or applying proxy configuration.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// Generated configuration failed validation; nothing was applied
    #[error("Proxy configuration rejected: {reason}")]
    Validation {
        /// Validator output
        reason: String,
    },

    /// Configuration could not be written
    #[error("Failed to write proxy configuration to {path}: {reason}")]
    Write {
        /// Target path
        path: String,
        /// Reason for the failure
        reason: String,
    },

    /// Configuration was written but the proxy did not reload
    #[error("Proxy reload failed: {reason}")]
    Reload {
        /// Reload command output
        reason: String,
    },

    /// A validate or reload command exceeded its time bound
    #[error("Proxy {operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// "validate" or "reload"
        operation: &'static str,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Route/certificate snapshot could not be read
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProxyError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Reload { .. } | Self::Timeout { .. } | Self::Write { .. } => true,
            Self::Validation { .. } => false,
            Self::Store(e) => e.is_transient(),
        }
    }
}

/// Errors raised by the domain verification state machine.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Malformed domain name
    #[error("Invalid domain name '{name}': {reason}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// Domain not registered
    #[error("Domain '{name}' not found")]
    NotFound {
        /// Domain name
        name: String,
    },

    /// Domain already registered
    #[error("Domain '{name}' already exists")]
    AlreadyExists {
        /// Domain name
        name: String,
    },

    /// Requested status change violates the lifecycle
    #[error("Domain '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// Domain name
        name: String,
        /// Current status
        from: DomainStatus,
        /// Requested status
        to: DomainStatus,
    },

    /// Operation requires a verified domain
    #[error("Domain '{name}' is {status}, expected verified")]
    NotVerified {
        /// Domain name
        name: String,
        /// Current status
        status: DomainStatus,
    },

    /// `CheckChallenge` called before `IssueChallenge`
    #[error("No verification challenge has been issued for '{name}'")]
    ChallengeNotIssued {
        /// Domain name
        name: String,
    },

    /// Auto-configuration requires zone detection first
    #[error("Zone for '{name}' is unknown; run zone detection first")]
    ZoneUnknown {
        /// Domain name
        name: String,
    },

    /// No credentials configured for the domain's provider
    #[error("No credentials configured for provider '{provider}' (domain '{name}')")]
    MissingCredentials {
        /// Domain name
        name: String,
        /// Provider name
        provider: String,
    },

    /// Activation requires an issued certificate
    #[error("Domain '{name}' has no issued certificate attached")]
    CertificateMissing {
        /// Domain name
        name: String,
    },

    /// DNS inspection failed
    #[error(transparent)]
    Dns(#[from] DnsError),

    /// Provider API failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Dns(e) => e.is_transient(),
            Self::Provider(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors raised by the certificate lifecycle manager.
#[derive(Error, Debug, Clone)]
pub enum CertificateError {
    /// Contact email rejected
    #[error("Invalid contact email '{email}'")]
    InvalidEmail {
        /// The rejected email
        email: String,
    },

    /// Domain not registered
    #[error("Domain '{domain}' not found")]
    DomainNotFound {
        /// Domain name
        domain: String,
    },

    /// Issuance requires ownership to be proven
    #[error("Domain '{domain}' is {status}; certificates require a verified domain")]
    DomainNotVerified {
        /// Domain name
        domain: String,
        /// Current domain status
        status: DomainStatus,
    },

    /// Renewal requires a current certificate
    #[error("Domain '{domain}' has no current certificate")]
    NoCertificate {
        /// Domain name
        domain: String,
    },

    /// Certificate cannot be renewed in its current state
    #[error("Certificate {id} is {status} and cannot be renewed")]
    NotRenewable {
        /// Certificate id
        id: Uuid,
        /// Current status
        status: CertificateStatus,
    },

    /// The certificate authority failed
    #[error("Certificate issuance for '{domain}' failed: {source}")]
    Authority {
        /// Domain name
        domain: String,
        /// CA failure
        #[source]
        source: CaError,
    },

    /// The background issuance task died before reporting an outcome
    #[error("Certificate operation for '{domain}' was interrupted: {reason}")]
    Interrupted {
        /// Domain name
        domain: String,
        /// Why the task ended
        reason: String,
    },

    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CertificateError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authority { source, .. } => source.is_transient(),
            Self::Store(e) => e.is_transient(),
            Self::Interrupted { .. } => true,
            _ => false,
        }
    }
}

/// Errors raised when creating or deleting routes.
#[derive(Error, Debug, Clone)]
pub enum RouteError {
    /// Upstream port out of range
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort {
        /// The rejected port
        port: u32,
    },

    /// Path must be absolute
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The rejected path
        path: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// Service id missing or malformed
    #[error("Invalid service id '{service_id}'")]
    InvalidService {
        /// The rejected service id
        service_id: String,
    },

    /// Referenced certificate does not exist
    #[error("Certificate {id} not found")]
    CertificateNotFound {
        /// Certificate id
        id: Uuid,
    },

    /// Referenced certificate is not servable
    #[error("Certificate {id} is {status}; routes may only reference issued certificates")]
    CertificateNotIssued {
        /// Certificate id
        id: Uuid,
        /// Current status
        status: CertificateStatus,
    },

    /// Referenced certificate belongs to another domain
    #[error("Certificate {id} was issued for '{certificate_domain}', not '{domain}'")]
    CertificateDomainMismatch {
        /// Certificate id
        id: Uuid,
        /// Domain the certificate covers
        certificate_domain: String,
        /// Domain of the route
        domain: String,
    },

    /// A certificate reference requires TLS
    #[error("Route for '{domain}' references a certificate but TLS is disabled")]
    CertificateWithoutTls {
        /// Domain name
        domain: String,
    },

    /// Another route already serves this domain and path
    #[error("A route for '{domain}{path}' already exists")]
    Conflict {
        /// Domain name
        domain: String,
        /// Route path
        path: String,
    },

    /// Route not found
    #[error("Route {id} not found")]
    NotFound {
        /// Route id
        id: Uuid,
    },

    /// Domain validation or creation failed
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RouteError {
    /// Whether the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Domain(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors raised while loading the daemon configuration.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read configuration file {path}: {reason}")]
    Read {
        /// File path
        path: String,
        /// I/O error
        reason: String,
    },

    /// The file is not valid YAML for the configuration schema
    #[error("Failed to parse configuration file {path}: {reason}")]
    Parse {
        /// File path
        path: String,
        /// Parser error
        reason: String,
    },

    /// A value is out of range or inconsistent
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid {
        /// Dotted field path (e.g., "pipeline.verification_attempts")
        field: &'static str,
        /// Explanation of what is invalid
        reason: String,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
