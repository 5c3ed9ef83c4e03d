// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Proxy reconciler.
//!
//! Rebuilds the complete proxy configuration from a consistent snapshot of
//! routes and certificates, lints it, asks the proxy to validate it, and only
//! then applies it. A rejected configuration leaves the live one untouched.
//!
//! Reconciles may be triggered concurrently (route changes, the pipeline, the
//! renewal scheduler). Each run holds the per-instance apply lock from snapshot
//! to reload, so the last reconcile to finish always applies the latest state.
//!
//! A reload failure after successful validation is returned to the caller but
//! does not touch the store; the next reconcile applies the same state again.

use crate::errors::ProxyError;
use crate::metrics;
use crate::proxy::{lint_config, ConfigRenderer, ProxyControl};
use crate::store::Store;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Summary of an applied configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileReport {
    pub routes: usize,
    pub tls_routes: usize,
    /// Hex SHA-256 of the applied configuration
    pub config_hash: String,
}

/// Rebuilds and applies proxy configuration.
pub struct ProxyReconciler {
    store: Arc<dyn Store>,
    renderer: ConfigRenderer,
    control: Arc<dyn ProxyControl>,
    apply_lock: Mutex<()>,
}

/// Hex SHA-256 of a configuration.
#[must_use]
pub fn config_hash(config: &str) -> String {
    Sha256::digest(config.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

impl ProxyReconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        renderer: ConfigRenderer,
        control: Arc<dyn ProxyControl>,
    ) -> Self {
        Self {
            store,
            renderer,
            control,
            apply_lock: Mutex::new(()),
        }
    }

    /// Rebuild, validate and apply the proxy configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Validation`] if the configuration is rejected
    /// (nothing applied), [`ProxyError::Write`], [`ProxyError::Reload`] or
    /// [`ProxyError::Timeout`] if applying fails, and [`ProxyError::Store`] if
    /// the snapshot cannot be read.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ProxyError> {
        let start = Instant::now();
        let _applying = self.apply_lock.lock().await;

        let result = self.rebuild().await;
        let outcome = match &result {
            Ok(_) => "applied",
            Err(ProxyError::Validation { .. } | ProxyError::Store(_)) => "rejected",
            Err(_) => "reload_failed",
        };
        metrics::record_reconcile(outcome, start.elapsed());
        if let Err(e) = &result {
            metrics::record_error("proxy", e.is_transient());
        }
        result
    }

    async fn rebuild(&self) -> Result<ReconcileReport, ProxyError> {
        let snapshot = self.store.snapshot().await?;
        let rendered = self.renderer.render(&snapshot);
        let hash = config_hash(&rendered.text);
        debug!(
            routes = rendered.routes,
            tls_routes = rendered.tls_routes,
            config_hash = %hash,
            "Rendered proxy configuration"
        );

        if let Err(e) = lint_config(&rendered.text) {
            error!(error = %e, "Generated proxy configuration failed lint");
            return Err(e);
        }
        if let Err(e) = self.control.validate(&rendered.text).await {
            warn!(error = %e, "Proxy rejected configuration, live configuration unchanged");
            return Err(e);
        }
        if let Err(e) = self.control.apply(&rendered.text).await {
            warn!(error = %e, "Proxy configuration written but not applied");
            return Err(e);
        }

        info!(
            routes = rendered.routes,
            tls_routes = rendered.tls_routes,
            config_hash = %hash,
            "Proxy configuration applied"
        );
        Ok(ReconcileReport {
            routes: rendered.routes,
            tls_routes: rendered.tls_routes,
            config_hash: hash,
        })
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod proxy_tests;
