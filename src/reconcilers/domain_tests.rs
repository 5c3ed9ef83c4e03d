// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::errors::DomainError;
    use crate::models::{Certificate, CertificateStatus, DomainStatus};
    use crate::store::Store;
    use crate::test_support::{Harness, EDGE_HOST};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let h = Harness::new();

        let domain = h.domains.create("Example.COM.").await.unwrap();
        assert_eq!(domain.name, "example.com");
        assert_eq!(domain.status, DomainStatus::Pending);

        let result = h.domains.create("example.com").await;
        assert!(matches!(result, Err(DomainError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_name() {
        let h = Harness::new();
        let result = h.domains.create("not a domain").await;
        assert!(matches!(result, Err(DomainError::InvalidName { .. })));
    }

    #[tokio::test]
    async fn test_issue_challenge_is_idempotent() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();

        let first = h.domains.issue_challenge("example.com").await.unwrap();
        let second = h.domains.issue_challenge("example.com").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.record_name, "_glinr-verify.example.com");
        assert_eq!(first.record_type, "TXT");
        let domain = h.domains.get("example.com").await.unwrap();
        assert_eq!(domain.status, DomainStatus::Verifying);
        assert_eq!(domain.verification_token, first.value);
    }

    #[tokio::test]
    async fn test_check_before_issue_is_rejected() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();

        let result = h.domains.check_challenge("example.com").await;

        assert!(matches!(result, Err(DomainError::ChallengeNotIssued { .. })));
        assert_eq!(h.dns.calls(), 0);
    }

    #[tokio::test]
    async fn test_mismatch_records_check_without_status_change() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();
        let challenge = h.domains.issue_challenge("example.com").await.unwrap();
        h.dns.set_txt(&challenge.record_name, &["something-else"]);

        let check = h.domains.check_challenge("example.com").await.unwrap();

        assert!(!check.matched);
        assert_eq!(check.domain.status, DomainStatus::Verifying);
        assert!(check.domain.verification_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_lookup_failure_still_records_check() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();
        h.domains.issue_challenge("example.com").await.unwrap();
        h.dns.fail.store(true, Ordering::SeqCst);

        let result = h.domains.check_challenge("example.com").await;

        assert!(matches!(result, Err(DomainError::Dns(_))));
        let domain = h.domains.get("example.com").await.unwrap();
        assert_eq!(domain.status, DomainStatus::Verifying);
        assert!(domain.verification_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_match_verifies_and_repeat_is_idempotent() {
        let h = Harness::new();
        h.verified_domain("example.com").await;

        let check = h.domains.check_challenge("example.com").await.unwrap();

        assert!(check.matched);
        assert_eq!(check.domain.status, DomainStatus::Verified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_leaves_row_unlocked() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();
        let challenge = h.domains.issue_challenge("example.com").await.unwrap();
        h.dns.set_txt(&challenge.record_name, &[&challenge.value]);
        *h.dns.delay.lock().unwrap() = Duration::from_secs(5);

        let (check, reissued) = tokio::join!(h.domains.check_challenge("example.com"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tokio::time::timeout(
                Duration::from_millis(100),
                h.domains.issue_challenge("example.com"),
            )
            .await
        });

        assert_eq!(reissued.unwrap().unwrap(), challenge);
        let check = check.unwrap();
        assert!(check.matched);
        assert_eq!(check.domain.status, DomainStatus::Verified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_deleted_during_lookup() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();
        let challenge = h.domains.issue_challenge("example.com").await.unwrap();
        h.dns.set_txt(&challenge.record_name, &[&challenge.value]);
        *h.dns.delay.lock().unwrap() = Duration::from_secs(5);

        let (check, deleted) = tokio::join!(h.domains.check_challenge("example.com"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.domains.delete("example.com").await
        });

        deleted.unwrap();
        assert!(matches!(check, Err(DomainError::NotFound { .. })));
        assert!(h.domains.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detect_zone_records_provider() {
        let h = Harness::new();
        h.domains.create("app.example.com").await.unwrap();

        let domain = h.domains.detect_zone("app.example.com").await.unwrap();

        assert_eq!(domain.provider.as_deref(), Some("cloudflare"));
        assert_eq!(domain.zone_name.as_deref(), Some("example.com"));
        assert_eq!(domain.zone_id.as_deref(), Some("zone-example.com"));
        assert!(!domain.is_apex());
    }

    #[tokio::test]
    async fn test_auto_configure_requires_zone() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();

        let result = h.domains.auto_configure("example.com").await;

        assert!(matches!(result, Err(DomainError::ZoneUnknown { .. })));
        assert_eq!(h.provider.creates(), 0);
    }

    #[tokio::test]
    async fn test_auto_configure_twice_creates_no_duplicates() {
        let h = Harness::new();
        h.domains.create("app.example.com").await.unwrap();
        h.domains.detect_zone("app.example.com").await.unwrap();

        let first = h.domains.auto_configure("app.example.com").await.unwrap();
        let second = h.domains.auto_configure("app.example.com").await.unwrap();

        assert_eq!(first, second);
        assert!(first.cname_record_id.is_some());
        assert_eq!(h.provider.creates(), 2);

        let records = h.provider.records.lock().unwrap().clone();
        let cname = records.iter().find(|r| r.record_type == "CNAME").unwrap();
        assert_eq!(cname.value, EDGE_HOST);

        // Status is never advanced by auto-configuration
        let domain = h.domains.get("app.example.com").await.unwrap();
        assert_eq!(domain.status, DomainStatus::Pending);
    }

    #[tokio::test]
    async fn test_auto_configure_apex_skips_cname() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();
        h.domains.detect_zone("example.com").await.unwrap();

        let configured = h.domains.auto_configure("example.com").await.unwrap();

        assert!(configured.cname_record_id.is_none());
        assert_eq!(h.provider.creates(), 1);
    }

    #[tokio::test]
    async fn test_activate_pending_is_rejected_without_mutation() {
        let h = Harness::new();
        let before = h.domains.create("example.com").await.unwrap();

        let result = h.domains.activate("example.com").await;

        assert!(matches!(
            result,
            Err(DomainError::NotVerified {
                status: DomainStatus::Pending,
                ..
            })
        ));
        assert_eq!(h.domains.get("example.com").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_activate_requires_issued_certificate() {
        let h = Harness::new();
        h.verified_domain("example.com").await;

        let result = h.domains.activate("example.com").await;
        assert!(matches!(result, Err(DomainError::CertificateMissing { .. })));

        // A queued certificate is not enough
        let queued = h
            .store
            .insert_certificate(Certificate::queued("example.com", "ops@example.com"))
            .await
            .unwrap();
        let mut domain = h.domains.get("example.com").await.unwrap();
        domain.certificate_id = Some(queued.id);
        h.store.update_domain(domain).await.unwrap();

        let result = h.domains.activate("example.com").await;
        assert!(matches!(result, Err(DomainError::CertificateMissing { .. })));

        let mut issued = queued;
        issued.status = CertificateStatus::Issued;
        h.store.update_certificate(issued).await.unwrap();

        let domain = h.domains.activate("example.com").await.unwrap();
        assert_eq!(domain.status, DomainStatus::Active);
        let again = h.domains.activate("example.com").await.unwrap();
        assert_eq!(again, domain);
    }

    #[tokio::test]
    async fn test_error_and_reset_keep_token() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();
        let challenge = h.domains.issue_challenge("example.com").await.unwrap();

        let errored = h
            .domains
            .mark_error("example.com", "dns misconfigured")
            .await
            .unwrap();
        assert_eq!(errored.status, DomainStatus::Error);
        assert_eq!(errored.last_error.as_deref(), Some("dns misconfigured"));

        let result = h.domains.issue_challenge("example.com").await;
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));

        let reset = h.domains.reset("example.com").await.unwrap();
        assert_eq!(reset.status, DomainStatus::Pending);
        assert!(reset.last_error.is_none());
        assert_eq!(reset.verification_token, challenge.value);
    }

    #[tokio::test]
    async fn test_reset_from_verified_is_rejected() {
        let h = Harness::new();
        h.verified_domain("example.com").await;

        let result = h.domains.reset("example.com").await;

        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let h = Harness::new();
        h.domains.create("b.example.com").await.unwrap();
        h.verified_domain("a.example.com").await;

        let all = h.domains.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let verified = h.domains.list(Some(DomainStatus::Verified)).await.unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].name, "a.example.com");

        h.domains.delete("b.example.com").await.unwrap();
        let result = h.domains.get("b.example.com").await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
        let result = h.domains.delete("b.example.com").await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
