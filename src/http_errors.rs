// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP status mapping in both directions.
//!
//! - Inbound: provider API status codes are mapped to [`ProviderError`] kinds
//!   ([`map_provider_status`]).
//! - Outbound: core errors are mapped to the HTTP status and reason the API layer
//!   returns ([`ApiError`], [`rejection_status`]). Synchronous rejections are 4xx;
//!   failures of external systems are 5xx.
//!
//! # Usage
//!
//! ```rust
//! use glinr_edge::errors::DomainError;
//! use glinr_edge::http_errors::rejection_status;
//!
//! let error = DomainError::NotFound { name: "example.com".to_string() };
//! assert_eq!(rejection_status(&error), 404);
//! ```

use crate::errors::{
    CaError, CertificateError, DnsError, DomainError, ProviderError, ProxyError, RouteError,
    StoreError,
};
use crate::status_reasons::{
    REASON_ALREADY_EXISTS, REASON_CERTIFICATE_AUTHORITY_ERROR, REASON_CERTIFICATE_NOT_ISSUED,
    REASON_DOMAIN_NOT_VERIFIED, REASON_INVALID_INPUT, REASON_INVALID_TRANSITION,
    REASON_MISSING_CREDENTIALS, REASON_NOT_FOUND, REASON_PRECONDITION_FAILED,
    REASON_PROVIDER_AUTH_FAILED, REASON_PROXY_CONFIG_INVALID, REASON_RATE_LIMITED,
    REASON_STORE_ERROR, REASON_UPSTREAM_TIMEOUT, REASON_UPSTREAM_UNAVAILABLE,
};

/// Map a provider HTTP status to a [`ProviderError`].
///
/// # HTTP Code Mapping
///
/// | HTTP Code | Error |
/// |-----------|-------|
/// | 401, 403 | `Authentication` |
/// | 429 | `RateLimited` |
/// | 5xx | `Unavailable` |
/// | Other | `Rejected` |
#[must_use]
pub fn map_provider_status(provider: &str, endpoint: &str, status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Authentication {
            provider: provider.to_string(),
            reason: format!("HTTP {status}: {body}"),
        },
        429 => ProviderError::RateLimited {
            provider: provider.to_string(),
        },
        500..=599 => ProviderError::Unavailable {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            reason: format!("HTTP {status}"),
        },
        _ => ProviderError::Rejected {
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            status,
            reason: body.to_string(),
        },
    }
}

/// An error that can be returned through the HTTP API.
pub trait ApiError: std::error::Error {
    /// HTTP status and machine-readable reason.
    fn api_status(&self) -> (u16, &'static str);
}

/// HTTP status for an error returned by a core operation.
#[must_use]
pub fn rejection_status(error: &impl ApiError) -> u16 {
    error.api_status().0
}

impl ApiError for StoreError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::NotFound { .. } => (404, REASON_NOT_FOUND),
            Self::Conflict { .. } => (409, REASON_ALREADY_EXISTS),
            Self::Unavailable(_) => (503, REASON_STORE_ERROR),
        }
    }
}

impl ApiError for DnsError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::InvalidName { .. } => (400, REASON_INVALID_INPUT),
            Self::ZoneNotFound { .. } => (422, REASON_PRECONDITION_FAILED),
            Self::Timeout { .. } => (504, REASON_UPSTREAM_TIMEOUT),
            Self::QueryFailed { .. } | Self::NoResolvers => (502, REASON_UPSTREAM_UNAVAILABLE),
        }
    }
}

impl ApiError for ProviderError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::Authentication { .. } => (502, REASON_PROVIDER_AUTH_FAILED),
            Self::ZoneNotFound { .. } => (422, REASON_PRECONDITION_FAILED),
            Self::RateLimited { .. } => (503, REASON_RATE_LIMITED),
            Self::Timeout { .. } => (504, REASON_UPSTREAM_TIMEOUT),
            Self::Unavailable { .. } | Self::Rejected { .. } | Self::InvalidResponse { .. } => {
                (502, REASON_UPSTREAM_UNAVAILABLE)
            }
        }
    }
}

impl ApiError for CaError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::RateLimited { .. } => (503, REASON_RATE_LIMITED),
            Self::Timeout { .. } => (504, REASON_UPSTREAM_TIMEOUT),
            _ => (502, REASON_CERTIFICATE_AUTHORITY_ERROR),
        }
    }
}

impl ApiError for ProxyError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::Validation { .. } => (500, REASON_PROXY_CONFIG_INVALID),
            Self::Timeout { .. } => (504, REASON_UPSTREAM_TIMEOUT),
            Self::Write { .. } | Self::Reload { .. } => (502, REASON_UPSTREAM_UNAVAILABLE),
            Self::Store(e) => e.api_status(),
        }
    }
}

impl ApiError for DomainError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::InvalidName { .. } => (400, REASON_INVALID_INPUT),
            Self::NotFound { .. } => (404, REASON_NOT_FOUND),
            Self::AlreadyExists { .. } => (409, REASON_ALREADY_EXISTS),
            Self::InvalidTransition { .. } => (409, REASON_INVALID_TRANSITION),
            Self::NotVerified { .. } => (409, REASON_DOMAIN_NOT_VERIFIED),
            Self::ChallengeNotIssued { .. }
            | Self::ZoneUnknown { .. }
            | Self::CertificateMissing { .. } => (422, REASON_PRECONDITION_FAILED),
            Self::MissingCredentials { .. } => (422, REASON_MISSING_CREDENTIALS),
            Self::Dns(e) => e.api_status(),
            Self::Provider(e) => e.api_status(),
            Self::Store(e) => e.api_status(),
        }
    }
}

impl ApiError for CertificateError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::InvalidEmail { .. } => (400, REASON_INVALID_INPUT),
            Self::DomainNotFound { .. } => (404, REASON_NOT_FOUND),
            Self::DomainNotVerified { .. } => (409, REASON_DOMAIN_NOT_VERIFIED),
            Self::NoCertificate { .. } | Self::NotRenewable { .. } => {
                (409, REASON_PRECONDITION_FAILED)
            }
            Self::Authority { source, .. } => source.api_status(),
            Self::Interrupted { .. } => (503, REASON_CERTIFICATE_AUTHORITY_ERROR),
            Self::Store(e) => e.api_status(),
        }
    }
}

impl ApiError for RouteError {
    fn api_status(&self) -> (u16, &'static str) {
        match self {
            Self::InvalidPort { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidService { .. }
            | Self::CertificateWithoutTls { .. } => (400, REASON_INVALID_INPUT),
            Self::CertificateNotFound { .. } | Self::NotFound { .. } => (404, REASON_NOT_FOUND),
            Self::CertificateNotIssued { .. } | Self::CertificateDomainMismatch { .. } => {
                (422, REASON_CERTIFICATE_NOT_ISSUED)
            }
            Self::Conflict { .. } => (409, REASON_ALREADY_EXISTS),
            Self::Domain(e) => e.api_status(),
            Self::Store(e) => e.api_status(),
        }
    }
}

#[cfg(test)]
#[path = "http_errors_tests.rs"]
mod http_errors_tests;
