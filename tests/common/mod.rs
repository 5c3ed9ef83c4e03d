// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests.
//!
//! Builds the full component graph around scripted DNS, provider and CA
//! collaborators, with a real [`NginxControl`] whose commands are `true` and
//! whose live configuration file lives in a temporary directory.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use glinr_edge::acme::{CertificateAuthority, IssuedCertificate};
use glinr_edge::dns::{DnsInspector, ZoneDetector, ZoneInfo};
use glinr_edge::errors::{CaError, DnsError, ProviderError};
use glinr_edge::locks::KeyedLocks;
use glinr_edge::models::ProvisioningProgress;
use glinr_edge::platform::Platform;
use glinr_edge::provider::{ProviderClient, ProviderRegistry};
use glinr_edge::proxy::nginx::NginxControl;
use glinr_edge::proxy::ConfigRenderer;
use glinr_edge::reconcilers::{
    CertificateManager, DomainVerifier, PipelineSettings, ProgressBoard, ProvisioningPipeline,
    ProxyReconciler,
};
use glinr_edge::store::{MemoryStore, Store};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const EDGE_HOST: &str = "edge.example.net";

/// TXT answers set by the test; every domain lives in the `example.com` zone.
#[derive(Default)]
pub struct ScriptedDns {
    answers: Mutex<HashMap<String, Vec<String>>>,
    lookups: AtomicU32,
    pub lookup_times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedDns {
    pub fn publish(&self, name: &str, value: &str) {
        self.answers
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsInspector for ScriptedDns {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.lookup_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        Ok(self
            .answers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ZoneDetector for ScriptedDns {
    async fn get_zone_info(&self, _domain: &str) -> Result<ZoneInfo, DnsError> {
        Ok(ZoneInfo {
            provider: "cloudflare".to_string(),
            zone: "example.com".to_string(),
        })
    }
}

/// Provider keeping one record per type and name.
#[derive(Default)]
pub struct RecordingProvider {
    pub records: Mutex<HashMap<(String, String), (String, String)>>,
    creates: AtomicU32,
}

impl RecordingProvider {
    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for RecordingProvider {
    fn name(&self) -> &str {
        "cloudflare"
    }

    async fn get_zone_id(&self, zone: &str) -> Result<String, ProviderError> {
        Ok(format!("zone-{zone}"))
    }

    async fn ensure_txt(
        &self,
        zone_id: &str,
        name: &str,
        value: &str,
    ) -> Result<String, ProviderError> {
        self.ensure_record(zone_id, "TXT", name, value, false).await
    }

    async fn ensure_record(
        &self,
        _zone_id: &str,
        record_type: &str,
        name: &str,
        value: &str,
        _proxied: bool,
    ) -> Result<String, ProviderError> {
        let mut records = self.records.lock().unwrap();
        let key = (record_type.to_string(), name.to_string());
        let next_id = format!("rec-{}", records.len() + 1);
        let entry = records.entry(key).or_insert_with(|| {
            self.creates.fetch_add(1, Ordering::SeqCst);
            (next_id, String::new())
        });
        entry.1 = value.to_string();
        Ok(entry.0.clone())
    }
}

/// CA issuing 90-day certificates under `cert_dir` without touching disk.
pub struct StubAuthority {
    cert_dir: PathBuf,
    calls: AtomicU32,
}

impl StubAuthority {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateAuthority for StubAuthority {
    async fn issue_certificate(
        &self,
        domain: &str,
        _email: &str,
    ) -> Result<IssuedCertificate, CaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(IssuedCertificate {
            expires_at: Utc::now() + chrono::Duration::days(90),
            chain_path: self.cert_dir.join(domain).join("fullchain.pem"),
            key_path: self.cert_dir.join(domain).join("privkey.pem"),
        })
    }
}

/// Fully wired provisioning core.
pub struct Edge {
    pub dir: TempDir,
    pub store: Arc<dyn Store>,
    pub dns: Arc<ScriptedDns>,
    pub provider: Arc<RecordingProvider>,
    pub authority: Arc<StubAuthority>,
    pub domains: Arc<DomainVerifier>,
    pub certificates: Arc<CertificateManager>,
    pub reconciler: Arc<ProxyReconciler>,
    pub pipeline: Arc<ProvisioningPipeline>,
    pub platform: Platform,
}

impl Edge {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cert_dir = dir.path().join("certs");
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let row_locks = Arc::new(KeyedLocks::new());
        let dns = Arc::new(ScriptedDns::default());
        let provider = Arc::new(RecordingProvider::default());
        let authority = Arc::new(StubAuthority {
            cert_dir: cert_dir.clone(),
            calls: AtomicU32::new(0),
        });

        let mut providers = ProviderRegistry::new();
        providers.register(provider.clone());

        let domains = Arc::new(DomainVerifier::new(
            store.clone(),
            row_locks.clone(),
            dns.clone(),
            dns.clone(),
            providers,
            EDGE_HOST.to_string(),
        ));
        let certificates = Arc::new(CertificateManager::new(
            store.clone(),
            row_locks,
            authority.clone(),
            Duration::from_secs(60),
        ));
        let control = NginxControl {
            config_path: dir.path().join("nginx.conf"),
            validate_command: vec!["true".to_string()],
            reload_command: vec!["true".to_string()],
            timeout: Duration::from_secs(5),
        };
        let reconciler = Arc::new(ProxyReconciler::new(
            store.clone(),
            ConfigRenderer {
                cert_dir,
                http_port: 80,
                https_port: 443,
            },
            Arc::new(control),
        ));
        let pipeline = Arc::new(ProvisioningPipeline::new(
            store.clone(),
            domains.clone(),
            certificates.clone(),
            reconciler.clone(),
            Arc::new(ProgressBoard::new()),
            PipelineSettings {
                verification_attempts: 5,
                backoff_step: Duration::from_secs(10),
                default_email: Some("ops@example.com".to_string()),
            },
        ));
        let platform = Platform::new(
            store.clone(),
            domains.clone(),
            certificates.clone(),
            reconciler.clone(),
            pipeline.clone(),
        );

        Self {
            dir,
            store,
            dns,
            provider,
            authority,
            domains,
            certificates,
            reconciler,
            pipeline,
            platform,
        }
    }

    /// Live proxy configuration, if one has been applied.
    pub fn live_config(&self) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join("nginx.conf")).ok()
    }

    /// Poll until the domain's pipeline run has finished.
    pub async fn wait_finished(&self, domain: &str) -> ProvisioningProgress {
        loop {
            if let Some(progress) = self.platform.provisioning(domain) {
                if progress.finished {
                    return progress;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
