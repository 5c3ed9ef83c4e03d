// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Scripted collaborators for unit tests.

use crate::acme::{CertificateAuthority, IssuedCertificate};
use crate::dns::{DnsInspector, ZoneDetector, ZoneInfo};
use crate::errors::{CaError, DnsError, ProviderError, ProxyError};
use crate::locks::KeyedLocks;
use crate::models::ProvisioningProgress;
use crate::platform::Platform;
use crate::provider::{ProviderClient, ProviderRegistry};
use crate::proxy::{ConfigRenderer, ProxyControl};
use crate::reconcilers::certificate::CertificateManager;
use crate::reconcilers::domain::DomainVerifier;
use crate::reconcilers::pipeline::{PipelineSettings, ProgressBoard, ProvisioningPipeline};
use crate::reconcilers::proxy::ProxyReconciler;
use crate::reconcilers::routes::RouteService;
use crate::store::{MemoryStore, Store};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EDGE_HOST: &str = "edge.glinr.test";

/// TXT answers keyed by record name.
#[derive(Default)]
pub struct MockDns {
    answers: Mutex<HashMap<String, Vec<String>>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Duration>,
    calls: AtomicU32,
    pub call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl MockDns {
    pub fn set_txt(&self, name: &str, values: &[&str]) {
        self.answers.lock().unwrap().insert(
            name.to_string(),
            values.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsInspector for MockDns {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DnsError::Timeout {
                name: name.to_string(),
                timeout_ms: 10,
            });
        }
        Ok(self
            .answers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

/// Reports every domain as living in one fixed zone.
pub struct MockZones {
    pub info: Option<ZoneInfo>,
}

#[async_trait]
impl ZoneDetector for MockZones {
    async fn get_zone_info(&self, domain: &str) -> Result<ZoneInfo, DnsError> {
        self.info.clone().ok_or_else(|| DnsError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockRecord {
    pub id: String,
    pub record_type: String,
    pub name: String,
    pub value: String,
}

/// In-memory provider that counts record creations.
#[derive(Default)]
pub struct MockProvider {
    pub records: Mutex<Vec<MockRecord>>,
    creates: AtomicU32,
}

impl MockProvider {
    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
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
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.record_type == record_type && r.name == name)
        {
            existing.value = value.to_string();
            return Ok(existing.id.clone());
        }
        let id = format!("rec-{}", records.len() + 1);
        records.push(MockRecord {
            id: id.clone(),
            record_type: record_type.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }
}

/// Certificate authority that issues 90-day certificates after `delay`.
pub struct MockAuthority {
    pub delay: Duration,
    pub fail: AtomicBool,
    calls: AtomicU32,
}

impl Default for MockAuthority {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(10),
            fail: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }
}

impl MockAuthority {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateAuthority for MockAuthority {
    async fn issue_certificate(
        &self,
        domain: &str,
        _email: &str,
    ) -> Result<IssuedCertificate, CaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(CaError::Order {
                domain: domain.to_string(),
                reason: "rejected by test".to_string(),
            });
        }
        Ok(IssuedCertificate {
            expires_at: Utc::now() + chrono::Duration::days(90),
            chain_path: PathBuf::from(format!("/certs/{domain}/fullchain.pem")),
            key_path: PathBuf::from(format!("/certs/{domain}/privkey.pem")),
        })
    }
}

/// Proxy that records applied configurations.
#[derive(Default)]
pub struct MockProxy {
    pub reject: AtomicBool,
    pub fail_reload: AtomicBool,
    pub applied: Mutex<Vec<String>>,
    validations: AtomicU32,
}

impl MockProxy {
    pub fn validations(&self) -> u32 {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn applies(&self) -> usize {
        self.applied.lock().unwrap().len()
    }
}

#[async_trait]
impl ProxyControl for MockProxy {
    async fn validate(&self, _config: &str) -> Result<(), ProxyError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(ProxyError::Validation {
                reason: "rejected by test".to_string(),
            });
        }
        Ok(())
    }

    async fn apply(&self, config: &str) -> Result<(), ProxyError> {
        self.applied.lock().unwrap().push(config.to_string());
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(ProxyError::Reload {
                reason: "reload failed in test".to_string(),
            });
        }
        Ok(())
    }
}

/// Every collaborator wired together around one [`MemoryStore`].
pub struct Harness {
    pub store: Arc<dyn Store>,
    pub dns: Arc<MockDns>,
    pub provider: Arc<MockProvider>,
    pub authority: Arc<MockAuthority>,
    pub proxy: Arc<MockProxy>,
    pub domains: Arc<DomainVerifier>,
    pub certificates: Arc<CertificateManager>,
    pub reconciler: Arc<ProxyReconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_authority(MockAuthority::default())
    }

    pub fn with_authority(authority: MockAuthority) -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let row_locks = Arc::new(KeyedLocks::new());
        let dns = Arc::new(MockDns::default());
        let provider = Arc::new(MockProvider::default());
        let authority = Arc::new(authority);
        let proxy = Arc::new(MockProxy::default());

        let mut providers = ProviderRegistry::new();
        providers.register(provider.clone());
        let zones = Arc::new(MockZones {
            info: Some(ZoneInfo {
                provider: "cloudflare".to_string(),
                zone: "example.com".to_string(),
            }),
        });

        let domains = Arc::new(DomainVerifier::new(
            store.clone(),
            row_locks.clone(),
            dns.clone(),
            zones,
            providers,
            EDGE_HOST.to_string(),
        ));
        let certificates = Arc::new(CertificateManager::new(
            store.clone(),
            row_locks,
            authority.clone(),
            Duration::from_secs(60),
        ));
        let reconciler = Arc::new(ProxyReconciler::new(
            store.clone(),
            ConfigRenderer {
                cert_dir: PathBuf::from("/certs"),
                http_port: 80,
                https_port: 443,
            },
            proxy.clone(),
        ));

        Self {
            store,
            dns,
            provider,
            authority,
            proxy,
            domains,
            certificates,
            reconciler,
        }
    }

    /// Create `name` and drive it to `verified` through a matching TXT record.
    pub async fn verified_domain(&self, name: &str) {
        self.domains.create(name).await.unwrap();
        let challenge = self.domains.issue_challenge(name).await.unwrap();
        self.dns.set_txt(&challenge.record_name, &[&challenge.value]);
        let check = self.domains.check_challenge(name).await.unwrap();
        assert!(check.matched);
    }

    pub fn pipeline(&self) -> Arc<ProvisioningPipeline> {
        Arc::new(ProvisioningPipeline::new(
            self.store.clone(),
            self.domains.clone(),
            self.certificates.clone(),
            self.reconciler.clone(),
            Arc::new(ProgressBoard::new()),
            PipelineSettings {
                verification_attempts: 5,
                backoff_step: Duration::from_secs(10),
                default_email: Some("ops@example.com".to_string()),
            },
        ))
    }

    /// Route service sharing this harness's collaborators and `pipeline`.
    pub fn routes(&self, pipeline: Arc<ProvisioningPipeline>) -> RouteService {
        RouteService::new(
            self.store.clone(),
            self.domains.clone(),
            self.reconciler.clone(),
            pipeline,
        )
    }

    /// Platform facade over this harness.
    pub fn platform(&self) -> Platform {
        Platform::new(
            self.store.clone(),
            self.domains.clone(),
            self.certificates.clone(),
            self.reconciler.clone(),
            self.pipeline(),
        )
    }

    /// Poll until the proxy has applied at least `count` configurations.
    pub async fn wait_applies(&self, count: usize) -> String {
        loop {
            {
                let applied = self.proxy.applied.lock().unwrap();
                if applied.len() >= count {
                    return applied[applied.len() - 1].clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Poll until the domain's run has finished.
pub async fn wait_finished(pipeline: &ProvisioningPipeline, domain: &str) -> ProvisioningProgress {
    loop {
        if let Some(progress) = pipeline.progress(domain) {
            if progress.finished {
                return progress;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
