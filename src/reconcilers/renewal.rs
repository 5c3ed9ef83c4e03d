// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Background certificate renewal.
//!
//! Periodically lists issued certificates that expire within the renewal
//! window, renews each one, and reconciles the proxy once if any renewal
//! succeeded. A failed renewal leaves a still-valid certificate serving.

use crate::constants::{MIN_RENEWAL_CHECK_INTERVAL_SECS, RENEWAL_CONCURRENCY};
use crate::errors::CertificateError;
use crate::reconcilers::certificate::CertificateManager;
use crate::reconcilers::proxy::ProxyReconciler;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one renewal sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Certificates inside the renewal window
    pub due: usize,
    pub renewed: usize,
    pub failed: usize,
}

/// Renews expiring certificates on a fixed interval.
pub struct RenewalScheduler {
    certificates: Arc<CertificateManager>,
    reconciler: Arc<ProxyReconciler>,
    renew_before: chrono::Duration,
    check_interval: Duration,
}

impl RenewalScheduler {
    /// The interval is clamped to a minimum of one minute.
    #[must_use]
    pub fn new(
        certificates: Arc<CertificateManager>,
        reconciler: Arc<ProxyReconciler>,
        renew_before: chrono::Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            certificates,
            reconciler,
            renew_before,
            check_interval: check_interval
                .max(Duration::from_secs(MIN_RENEWAL_CHECK_INTERVAL_SECS)),
        }
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Renew every certificate inside the window.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Store`] if certificates cannot be listed.
    /// Individual renewal failures are counted, not returned.
    pub async fn sweep(&self) -> Result<SweepReport, CertificateError> {
        let due = self
            .certificates
            .list_expiring_soon(self.renew_before)
            .await?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };
        if due.is_empty() {
            debug!("No certificates due for renewal");
            return Ok(report);
        }

        info!(count = due.len(), "Renewing expiring certificates");
        let outcomes: Vec<bool> = stream::iter(&due)
            .map(|certificate| async move {
                match self.certificates.renew(&certificate.domain).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(
                            domain = %certificate.domain,
                            certificate_id = %certificate.id,
                            error = %e,
                            "Renewal failed, will retry next sweep"
                        );
                        false
                    }
                }
            })
            .buffer_unordered(RENEWAL_CONCURRENCY)
            .boxed()
            .collect()
            .await;
        report.renewed = outcomes.iter().filter(|ok| **ok).count();
        report.failed = outcomes.len() - report.renewed;

        if report.renewed > 0 {
            if let Err(e) = self.reconciler.reconcile().await {
                error!(error = %e, "Reconcile after renewal failed");
            }
        }
        info!(
            renewed = report.renewed,
            failed = report.failed,
            "Renewal sweep finished"
        );
        Ok(report)
    }

    /// Sweep immediately, then once per interval, forever.
    pub async fn run(self: Arc<Self>) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            renew_before_days = self.renew_before.num_days(),
            "Starting certificate renewal scheduler"
        );

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep().await {
                error!(error = %e, "Certificate renewal sweep failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "renewal_tests.rs"]
mod renewal_tests;
