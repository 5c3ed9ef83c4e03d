// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status_reasons` module

#[cfg(test)]
mod tests {
    use crate::status_reasons::*;

    const ALL_REASONS: &[&str] = &[
        REASON_INVALID_INPUT,
        REASON_NOT_FOUND,
        REASON_ALREADY_EXISTS,
        REASON_INVALID_TRANSITION,
        REASON_DOMAIN_NOT_VERIFIED,
        REASON_PRECONDITION_FAILED,
        REASON_MISSING_CREDENTIALS,
        REASON_CERTIFICATE_NOT_ISSUED,
        REASON_PROXY_CONFIG_INVALID,
        REASON_PROVIDER_AUTH_FAILED,
        REASON_UPSTREAM_UNAVAILABLE,
        REASON_UPSTREAM_TIMEOUT,
        REASON_RATE_LIMITED,
        REASON_CERTIFICATE_AUTHORITY_ERROR,
        REASON_STORE_ERROR,
    ];

    #[test]
    fn test_reasons_are_camel_case() {
        for reason in ALL_REASONS {
            assert!(reason.chars().next().unwrap().is_ascii_uppercase(), "{reason}");
            assert!(reason.chars().all(|c| c.is_ascii_alphanumeric()), "{reason}");
        }
    }

    #[test]
    fn test_reasons_are_unique() {
        let mut sorted = ALL_REASONS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ALL_REASONS.len());
    }

    #[test]
    fn test_reason_values() {
        assert_eq!(REASON_INVALID_TRANSITION, "InvalidTransition");
        assert_eq!(REASON_DOMAIN_NOT_VERIFIED, "DomainNotVerified");
        assert_eq!(REASON_RATE_LIMITED, "RateLimited");
    }
}
