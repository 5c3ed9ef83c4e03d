// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for error types.

#[cfg(test)]
mod tests {
    use crate::errors::*;
    use crate::models::{CertificateStatus, DomainStatus};
    use std::error::Error as _;
    use uuid::Uuid;

    #[test]
    fn test_store_not_found_error() {
        let error = StoreError::NotFound {
            kind: "domain",
            key: "example.com".to_string(),
        };

        assert_eq!(error.to_string(), "domain 'example.com' not found");
        assert!(!error.is_transient());
    }

    #[test]
    fn test_store_unavailable_is_transient() {
        let error = StoreError::Unavailable("connection refused".to_string());
        assert!(error.is_transient());
    }

    #[test]
    fn test_dns_query_failed_error() {
        let error = DnsError::QueryFailed {
            name: "_glinr-verify.example.com".to_string(),
            server: "1.1.1.1:53".to_string(),
            reason: "connection refused".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "DNS query for '_glinr-verify.example.com' against 1.1.1.1:53 failed: connection refused"
        );
        assert!(error.is_transient());
    }

    #[test]
    fn test_dns_invalid_name_is_permanent() {
        let error = DnsError::InvalidName {
            name: "bad..name".to_string(),
            reason: "empty label".to_string(),
        };
        assert!(!error.is_transient());
        assert!(!DnsError::NoResolvers.is_transient());
    }

    #[test]
    fn test_provider_rejected_error() {
        let error = ProviderError::Rejected {
            provider: "cloudflare".to_string(),
            endpoint: "https://api.cloudflare.com/client/v4/zones".to_string(),
            status: 400,
            reason: "Invalid record".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "cloudflare rejected request to https://api.cloudflare.com/client/v4/zones (HTTP 400): Invalid record"
        );
        assert!(!error.is_transient());
    }

    #[test]
    fn test_provider_transient_errors() {
        let rate_limited = ProviderError::RateLimited {
            provider: "cloudflare".to_string(),
        };
        let unavailable = ProviderError::Unavailable {
            provider: "cloudflare".to_string(),
            endpoint: "https://api.cloudflare.com".to_string(),
            reason: "HTTP 503".to_string(),
        };
        let auth = ProviderError::Authentication {
            provider: "cloudflare".to_string(),
            reason: "Invalid token".to_string(),
        };

        assert!(rate_limited.is_transient());
        assert!(unavailable.is_transient());
        assert!(!auth.is_transient());
    }

    #[test]
    fn test_proxy_validation_is_not_transient() {
        let validation = ProxyError::Validation {
            reason: "unexpected \"}\"".to_string(),
        };
        let reload = ProxyError::Reload {
            reason: "nginx is not running".to_string(),
        };

        assert_eq!(
            validation.to_string(),
            "Proxy configuration rejected: unexpected \"}\""
        );
        assert!(!validation.is_transient());
        assert!(reload.is_transient());
    }

    #[test]
    fn test_domain_invalid_transition_error() {
        let error = DomainError::InvalidTransition {
            name: "example.com".to_string(),
            from: DomainStatus::Pending,
            to: DomainStatus::Active,
        };

        assert_eq!(
            error.to_string(),
            "Domain 'example.com' cannot move from pending to active"
        );
        assert!(!error.is_transient());
    }

    #[test]
    fn test_domain_error_wraps_dns_error_transparently() {
        let error: DomainError = DnsError::Timeout {
            name: "example.com".to_string(),
            timeout_ms: 10_000,
        }
        .into();

        assert_eq!(
            error.to_string(),
            "DNS query for 'example.com' timed out after 10000ms"
        );
        assert!(error.is_transient());
    }

    #[test]
    fn test_certificate_authority_error_keeps_source() {
        let error = CertificateError::Authority {
            domain: "example.com".to_string(),
            source: CaError::RateLimited {
                domain: "example.com".to_string(),
            },
        };

        assert_eq!(
            error.to_string(),
            "Certificate issuance for 'example.com' failed: Certificate authority rate limited issuance for 'example.com'"
        );
        assert!(error.source().is_some());
        assert!(error.is_transient());
    }

    #[test]
    fn test_certificate_not_renewable_error() {
        let id = Uuid::nil();
        let error = CertificateError::NotRenewable {
            id,
            status: CertificateStatus::Queued,
        };

        assert_eq!(
            error.to_string(),
            format!("Certificate {id} is queued and cannot be renewed")
        );
    }

    #[test]
    fn test_route_errors() {
        let port = RouteError::InvalidPort { port: 70_000 };
        let conflict = RouteError::Conflict {
            domain: "example.com".to_string(),
            path: "/api".to_string(),
        };

        assert_eq!(
            port.to_string(),
            "Invalid port 70000: must be between 1 and 65535"
        );
        assert_eq!(
            conflict.to_string(),
            "A route for 'example.com/api' already exists"
        );
        assert!(!conflict.is_transient());
    }
}
