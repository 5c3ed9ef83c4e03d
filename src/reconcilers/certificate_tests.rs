// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::errors::CertificateError;
    use crate::models::{Certificate, CertificateStatus, DomainStatus};
    use crate::reconcilers::certificate::expiring_within;
    use crate::store::Store;
    use crate::test_support::{Harness, MockAuthority};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn issued_expiring(domain: &str, expires_at: Option<chrono::DateTime<Utc>>) -> Certificate {
        let mut cert = Certificate::queued(domain, "ops@example.com");
        cert.status = CertificateStatus::Issued;
        cert.expires_at = expires_at;
        cert
    }

    #[test]
    fn test_expiring_within_window() {
        let now = Utc::now();
        let certs = vec![
            issued_expiring("a.example.com", Some(now + ChronoDuration::days(1))),
            issued_expiring("b.example.com", Some(now + ChronoDuration::days(6))),
            issued_expiring("c.example.com", Some(now + ChronoDuration::days(8))),
            issued_expiring("d.example.com", None),
        ];

        let soon = expiring_within(&certs, now, ChronoDuration::days(7));

        let names: Vec<&str> = soon.iter().map(|c| c.domain.as_str()).collect();
        assert_eq!(names, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_expiring_within_is_half_open() {
        let now = Utc::now();
        let certs = vec![
            issued_expiring("now.example.com", Some(now)),
            issued_expiring("edge.example.com", Some(now + ChronoDuration::days(7))),
            issued_expiring("past.example.com", Some(now - ChronoDuration::seconds(1))),
        ];

        let soon = expiring_within(&certs, now, ChronoDuration::days(7));

        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].domain, "now.example.com");
    }

    #[test]
    fn test_expiring_within_ignores_non_issued() {
        let now = Utc::now();
        let mut renewing = issued_expiring("a.example.com", Some(now + ChronoDuration::days(1)));
        renewing.status = CertificateStatus::Renewing;
        let mut failed = issued_expiring("b.example.com", Some(now + ChronoDuration::days(1)));
        failed.status = CertificateStatus::Failed;

        assert!(expiring_within(&[renewing, failed], now, ChronoDuration::days(7)).is_empty());
    }

    #[tokio::test]
    async fn test_issue_requires_verified_domain() {
        let h = Harness::new();
        h.domains.create("example.com").await.unwrap();

        let result = h.certificates.issue("example.com", "ops@example.com").await;

        assert!(matches!(
            result,
            Err(CertificateError::DomainNotVerified {
                status: DomainStatus::Pending,
                ..
            })
        ));
        assert!(h.certificates.list().await.unwrap().is_empty());
        assert_eq!(h.authority.calls(), 0);
    }

    #[tokio::test]
    async fn test_issue_rejects_invalid_email() {
        let h = Harness::new();
        h.verified_domain("example.com").await;

        for email in ["", "ops", "ops@", "@example.com", "ops@example", "o ps@example.com"] {
            let result = h.certificates.issue("example.com", email).await;
            assert!(
                matches!(result, Err(CertificateError::InvalidEmail { .. })),
                "{email:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_issue_success_attaches_to_domain() {
        let h = Harness::new();
        h.verified_domain("example.com").await;

        let cert = h
            .certificates
            .issue("example.com", "ops@example.com")
            .await
            .unwrap();

        assert_eq!(cert.status, CertificateStatus::Issued);
        assert!(cert.expires_at.unwrap() > Utc::now() + ChronoDuration::days(89));
        assert!(cert.last_issued_at.is_some());
        let domain = h.domains.get("example.com").await.unwrap();
        assert_eq!(domain.certificate_id, Some(cert.id));
        assert_eq!(h.certificates.get_by_domain("example.com").await.unwrap(), cert);
    }

    #[tokio::test]
    async fn test_issue_again_returns_current_certificate() {
        let h = Harness::new();
        h.verified_domain("example.com").await;

        let first = h.certificates.issue("example.com", "ops@example.com").await.unwrap();
        let second = h.certificates.issue("example.com", "ops@example.com").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(h.authority.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_issue_calls_ca_once() {
        let h = Harness::with_authority(MockAuthority::with_delay(Duration::from_millis(200)));
        h.verified_domain("example.com").await;

        let (a, b) = tokio::join!(
            h.certificates.issue("example.com", "ops@example.com"),
            h.certificates.issue("example.com", "ops@example.com"),
        );

        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(h.authority.calls(), 1);
        assert_eq!(h.certificates.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_failed_issue_calls_ca_once() {
        let h = Harness::with_authority(MockAuthority::with_delay(Duration::from_millis(200)));
        h.verified_domain("example.com").await;
        h.authority.fail.store(true, Ordering::SeqCst);

        let (a, b) = tokio::join!(
            h.certificates.issue("example.com", "ops@example.com"),
            h.certificates.issue("example.com", "ops@example.com"),
        );

        assert!(matches!(a, Err(CertificateError::Authority { .. })));
        assert!(matches!(b, Err(CertificateError::Authority { .. })));
        assert_eq!(h.authority.calls(), 1);
        let certs = h.certificates.list().await.unwrap();
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].status, CertificateStatus::Failed);

        // A later call starts a fresh issuance
        h.authority.fail.store(false, Ordering::SeqCst);
        let cert = h
            .certificates
            .issue("example.com", "ops@example.com")
            .await
            .unwrap();
        assert_eq!(cert.status, CertificateStatus::Issued);
        assert_eq!(h.authority.calls(), 2);
    }

    #[tokio::test]
    async fn test_issue_failure_records_failed_certificate() {
        let h = Harness::new();
        h.verified_domain("example.com").await;
        h.authority.fail.store(true, Ordering::SeqCst);

        let result = h.certificates.issue("example.com", "ops@example.com").await;

        assert!(matches!(result, Err(CertificateError::Authority { .. })));
        let certs = h.certificates.list().await.unwrap();
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].status, CertificateStatus::Failed);
        assert!(certs[0].last_error.is_some());
        // Domain is left in its last valid state
        let domain = h.domains.get("example.com").await.unwrap();
        assert_eq!(domain.status, DomainStatus::Verified);
        assert!(domain.certificate_id.is_none());
        assert!(matches!(
            h.certificates.get_by_domain("example.com").await,
            Err(CertificateError::NoCertificate { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_times_out() {
        let h = Harness::with_authority(MockAuthority::with_delay(Duration::from_secs(120)));
        h.verified_domain("example.com").await;

        let result = h.certificates.issue("example.com", "ops@example.com").await;

        match result {
            Err(CertificateError::Authority { source, .. }) => assert!(source.is_transient()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_renew_success_extends_expiry() {
        let h = Harness::new();
        h.verified_domain("example.com").await;
        let mut cert = issued_expiring("example.com", Some(Utc::now() + ChronoDuration::days(5)));
        cert = h.store.insert_certificate(cert).await.unwrap();

        let renewed = h.certificates.renew("example.com").await.unwrap();

        assert_eq!(renewed.id, cert.id);
        assert_eq!(renewed.status, CertificateStatus::Issued);
        assert!(renewed.expires_at.unwrap() > cert.expires_at.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_renew_still_completes() {
        let h = Harness::with_authority(MockAuthority::with_delay(Duration::from_secs(10)));
        let cert = issued_expiring("example.com", Some(Utc::now() + ChronoDuration::days(5)));
        h.store.insert_certificate(cert.clone()).await.unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), h.certificates.renew("example.com")).await;
        assert!(abandoned.is_err());
        let during = h.store.get_certificate(cert.id).await.unwrap();
        assert_eq!(during.status, CertificateStatus::Renewing);

        tokio::time::sleep(Duration::from_secs(30)).await;

        let stored = h.store.get_certificate(cert.id).await.unwrap();
        assert_eq!(stored.status, CertificateStatus::Issued);
        assert!(stored.expires_at.unwrap() > cert.expires_at.unwrap());
        assert_eq!(h.authority.calls(), 1);

        // Nothing is left in flight for the next renewal
        h.certificates.renew("example.com").await.unwrap();
        assert_eq!(h.authority.calls(), 2);
    }

    #[tokio::test]
    async fn test_renew_failure_keeps_valid_certificate() {
        let h = Harness::new();
        let cert = issued_expiring("example.com", Some(Utc::now() + ChronoDuration::days(5)));
        h.store.insert_certificate(cert.clone()).await.unwrap();
        h.authority.fail.store(true, Ordering::SeqCst);

        let result = h.certificates.renew("example.com").await;

        assert!(matches!(result, Err(CertificateError::Authority { .. })));
        let stored = h.store.get_certificate(cert.id).await.unwrap();
        assert_eq!(stored.status, CertificateStatus::Issued);
        assert_eq!(stored.expires_at, cert.expires_at);
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn test_renew_failure_on_expired_certificate_fails_it() {
        let h = Harness::new();
        let cert = issued_expiring("example.com", Some(Utc::now() - ChronoDuration::days(1)));
        h.store.insert_certificate(cert.clone()).await.unwrap();
        h.authority.fail.store(true, Ordering::SeqCst);

        let _ = h.certificates.renew("example.com").await;

        let stored = h.store.get_certificate(cert.id).await.unwrap();
        assert_eq!(stored.status, CertificateStatus::Failed);
    }

    #[tokio::test]
    async fn test_renew_without_certificate() {
        let h = Harness::new();

        let result = h.certificates.renew("example.com").await;

        assert!(matches!(result, Err(CertificateError::NoCertificate { .. })));
    }

    #[tokio::test]
    async fn test_renew_queued_is_rejected() {
        let h = Harness::new();
        h.store
            .insert_certificate(Certificate::queued("example.com", "ops@example.com"))
            .await
            .unwrap();

        let result = h.certificates.renew("example.com").await;

        assert!(matches!(result, Err(CertificateError::NotRenewable { .. })));
        assert_eq!(h.authority.calls(), 0);
    }

    #[tokio::test]
    async fn test_list_expiring_soon() {
        let h = Harness::new();
        let now = Utc::now();
        for (domain, days) in [("a.example.com", 1), ("b.example.com", 6), ("c.example.com", 8)] {
            let cert = issued_expiring(domain, Some(now + ChronoDuration::days(days)));
            h.store.insert_certificate(cert).await.unwrap();
        }
        h.store
            .insert_certificate(issued_expiring("d.example.com", None))
            .await
            .unwrap();

        let soon = h
            .certificates
            .list_expiring_soon(ChronoDuration::days(7))
            .await
            .unwrap();

        assert_eq!(soon.len(), 2);
        assert_eq!(h.certificates.list().await.unwrap().len(), 4);
    }
}
