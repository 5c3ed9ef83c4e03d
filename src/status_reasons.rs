// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Machine-readable reasons attached to API rejections and provisioning failures.
//!
//! Reasons are programmatic identifiers in CamelCase. The API layer returns them
//! next to the HTTP status so clients can branch without parsing messages.
//!
//! # Example Response
//!
//! ```json
//! {
//!   "status": 409,
//!   "reason": "InvalidTransition",
//!   "message": "Domain 'example.com' cannot move from pending to active"
//! }
//! ```

// ============================================================================
// Synchronous Rejections (4xx)
// ============================================================================

/// Malformed input (domain name, email, port, path).
pub const REASON_INVALID_INPUT: &str = "InvalidInput";

/// The referenced domain, certificate or route does not exist.
pub const REASON_NOT_FOUND: &str = "NotFound";

/// A resource with the same unique key already exists.
pub const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// The requested status change violates the domain lifecycle.
pub const REASON_INVALID_TRANSITION: &str = "InvalidTransition";

/// The operation requires a verified domain.
pub const REASON_DOMAIN_NOT_VERIFIED: &str = "DomainNotVerified";

/// A prerequisite step has not been performed (challenge, zone detection, certificate).
pub const REASON_PRECONDITION_FAILED: &str = "PreconditionFailed";

/// No credentials are configured for the domain's DNS provider.
pub const REASON_MISSING_CREDENTIALS: &str = "MissingCredentials";

/// A route references a certificate that cannot be served.
pub const REASON_CERTIFICATE_NOT_ISSUED: &str = "CertificateNotIssued";

/// Generated proxy configuration failed validation.
pub const REASON_PROXY_CONFIG_INVALID: &str = "ProxyConfigInvalid";

// ============================================================================
// Upstream Failures (5xx)
// ============================================================================

/// The DNS provider rejected our credentials.
pub const REASON_PROVIDER_AUTH_FAILED: &str = "ProviderAuthFailed";

/// An external system (DNS, provider, CA, proxy) is unavailable.
pub const REASON_UPSTREAM_UNAVAILABLE: &str = "UpstreamUnavailable";

/// An external system did not answer in time.
pub const REASON_UPSTREAM_TIMEOUT: &str = "UpstreamTimeout";

/// An external system is rate limiting us.
pub const REASON_RATE_LIMITED: &str = "RateLimited";

/// The certificate authority refused the request.
pub const REASON_CERTIFICATE_AUTHORITY_ERROR: &str = "CertificateAuthorityError";

/// The persistence layer failed.
pub const REASON_STORE_ERROR: &str = "StoreError";

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
