// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data model for domains, certificates, routes and provisioning progress.
//!
//! # Resource Types
//!
//! - [`Domain`] - A customer domain name and its verification state
//! - [`Certificate`] - A TLS certificate issued (or being issued) for a domain
//! - [`Route`] - Maps `domain + path` to a running service port
//! - [`ProvisioningProgress`] - Ephemeral, pollable record of one pipeline run
//!
//! # Domain Lifecycle
//!
//! ```text
//! pending ──► verifying ──► verified ──► active
//!    ▲                                      │
//!    └──────────── error ◄──────────────────┘ (from any status)
//! ```
//!
//! Status only moves forward, except for the explicit `error ─► pending` reset.
//!
//! # Example
//!
//! ```rust
//! use glinr_edge::models::{Domain, DomainStatus};
//!
//! let domain = Domain::new("example.com".to_string());
//! assert_eq!(domain.status, DomainStatus::Pending);
//! assert_eq!(domain.challenge_record_name(), "_glinr-verify.example.com");
//! ```

use crate::constants::{
    MAX_DOMAIN_LENGTH, MAX_LABEL_LENGTH, VERIFICATION_RECORD_PREFIX, VERIFICATION_RECORD_TYPE,
    VERIFICATION_TOKEN_BYTES,
};
use crate::errors::DomainError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Domain
// ============================================================================

/// Verification status of a [`Domain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    /// Registered, no challenge issued yet
    Pending,
    /// Challenge issued, waiting for the TXT record to appear
    Verifying,
    /// Ownership proven
    Verified,
    /// Certificate attached and proxy serving
    Active,
    /// Parked after an unrecoverable problem; leaves only via reset
    Error,
}

impl DomainStatus {
    /// Wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::Active => "active",
            Self::Error => "error",
        }
    }

    /// Position on the forward path; `None` for `Error`.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Verifying => Some(1),
            Self::Verified => Some(2),
            Self::Active => Some(3),
            Self::Error => None,
        }
    }

    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// Staying in the same status is always legal (idempotent operations).
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to == from + 1,
            // Any status may be parked in error
            (Some(_), None) => true,
            // Only an explicit reset leaves error
            (None, Some(to)) => to == 0,
            (None, None) => true,
        }
    }

    /// Whether domain ownership has been proven.
    #[must_use]
    pub fn is_verified(self) -> bool {
        matches!(self, Self::Verified | Self::Active)
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "verifying" => Ok(Self::Verifying),
            "verified" => Ok(Self::Verified),
            "active" => Ok(Self::Active),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown domain status '{other}'")),
        }
    }
}

/// A customer domain managed by the platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    /// Fully qualified, lowercase, without trailing dot. Unique.
    pub name: String,
    pub status: DomainStatus,
    /// DNS provider hosting the zone (e.g., "cloudflare")
    pub provider: Option<String>,
    /// Provider-side zone identifier
    pub zone_id: Option<String>,
    /// Zone apex the domain lives in (e.g., "example.com" for "app.example.com")
    pub zone_name: Option<String>,
    /// Opaque challenge secret. Generated once at creation, never rotated.
    pub verification_token: String,
    /// Last time the challenge record was checked, whatever the outcome
    pub verification_checked_at: Option<DateTime<Utc>>,
    pub certificate_id: Option<Uuid>,
    /// Reason recorded when the domain was parked in `error`
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    /// Create a pending domain with a fresh verification token.
    ///
    /// The name is expected to be normalized already (see [`normalize_domain_name`]).
    #[must_use]
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            status: DomainStatus::Pending,
            provider: None,
            zone_id: None,
            zone_name: None,
            verification_token: generate_verification_token(),
            verification_checked_at: None,
            certificate_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name of the TXT record that proves ownership.
    #[must_use]
    pub fn challenge_record_name(&self) -> String {
        challenge_record_name(&self.name)
    }

    /// Move to `next`, enforcing the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] for regressions and skipped steps.
    pub fn transition(&mut self, next: DomainStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                name: self.name.clone(),
                from: self.status,
                to: next,
            });
        }
        if self.status != next {
            self.status = next;
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Whether the domain is the apex of its zone.
    ///
    /// Falls back to a two-label heuristic when the zone has not been detected.
    #[must_use]
    pub fn is_apex(&self) -> bool {
        match &self.zone_name {
            Some(zone) => zone.eq_ignore_ascii_case(&self.name),
            None => self.name.split('.').count() <= 2,
        }
    }

    /// What the user should do next, derived purely from status.
    #[must_use]
    pub fn next_action(&self) -> NextAction {
        match self.status {
            DomainStatus::Pending => NextAction::IssueChallenge,
            DomainStatus::Verifying => NextAction::PublishChallengeRecord,
            DomainStatus::Verified if self.certificate_id.is_none() => NextAction::IssueCertificate,
            DomainStatus::Verified => NextAction::Activate,
            DomainStatus::Active => NextAction::None,
            DomainStatus::Error => NextAction::Reset,
        }
    }

    /// DNS records the user must publish, derived purely from status.
    ///
    /// Non-apex names also need a CNAME to the platform edge.
    #[must_use]
    pub fn dns_instructions(&self, edge_host: &str) -> Vec<DnsInstruction> {
        let mut instructions = Vec::new();
        if matches!(self.status, DomainStatus::Pending | DomainStatus::Verifying) {
            instructions.push(DnsInstruction {
                record_type: VERIFICATION_RECORD_TYPE.to_string(),
                name: self.challenge_record_name(),
                value: self.verification_token.clone(),
            });
        }
        if self.status != DomainStatus::Error && !self.is_apex() {
            instructions.push(DnsInstruction {
                record_type: "CNAME".to_string(),
                name: self.name.clone(),
                value: edge_host.to_string(),
            });
        }
        instructions
    }
}

/// Suggested next step for a domain, computed for API consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    IssueChallenge,
    PublishChallengeRecord,
    IssueCertificate,
    Activate,
    Reset,
    None,
}

/// A DNS record the user (or auto-configuration) must publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsInstruction {
    pub record_type: String,
    pub name: String,
    pub value: String,
}

/// Challenge returned by `IssueChallenge`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub record_type: String,
    pub record_name: String,
    pub value: String,
}

/// Build the challenge record name for a domain.
#[must_use]
pub fn challenge_record_name(domain: &str) -> String {
    format!("{VERIFICATION_RECORD_PREFIX}.{domain}")
}

/// Generate an opaque, collision-resistant verification token.
#[must_use]
pub fn generate_verification_token() -> String {
    let bytes: [u8; VERIFICATION_TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Validate and normalize a user-supplied domain name.
///
/// Lowercases, strips one trailing dot and checks RFC 1035 label rules.
/// Wildcards and single-label names are rejected.
///
/// # Errors
///
/// Returns [`DomainError::InvalidName`] describing the first violation.
pub fn normalize_domain_name(raw: &str) -> Result<String, DomainError> {
    let invalid = |reason: &str| DomainError::InvalidName {
        name: raw.to_string(),
        reason: reason.to_string(),
    };

    let name = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_DOMAIN_LENGTH {
        return Err(invalid("name exceeds 253 characters"));
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("name must contain at least two labels"));
    }
    for label in &labels {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(invalid("label exceeds 63 characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("label cannot start or end with a hyphen"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(invalid("labels may only contain letters, digits and hyphens"));
        }
    }
    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(invalid("top-level label cannot be numeric"));
    }

    Ok(name)
}

// ============================================================================
// Certificate
// ============================================================================

/// Issuance status of a [`Certificate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Queued,
    Issued,
    Renewing,
    Failed,
}

impl CertificateStatus {
    /// Wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Issued => "issued",
            Self::Renewing => "renewing",
            Self::Failed => "failed",
        }
    }

    /// Candidate for "current certificate" of a domain.
    #[must_use]
    pub fn is_current(self) -> bool {
        self != Self::Failed
    }

    /// Certificate material exists on disk and may be served.
    ///
    /// A renewing certificate keeps serving until the replacement is issued.
    #[must_use]
    pub fn is_servable(self) -> bool {
        matches!(self, Self::Issued | Self::Renewing)
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A TLS certificate for one domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub domain: String,
    /// ACME account contact
    pub email: String,
    pub status: CertificateStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_issued_at: Option<DateTime<Utc>>,
    /// Most recent CA failure, kept after a successful retry for diagnostics
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// A freshly requested certificate.
    #[must_use]
    pub fn queued(domain: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            domain: domain.to_string(),
            email: email.to_string(),
            status: CertificateStatus::Queued,
            expires_at: None,
            last_issued_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the certificate is still valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires > now)
    }
}

// ============================================================================
// Route
// ============================================================================

/// Maps a public `domain + path` to a service port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub service_id: String,
    pub domain: String,
    pub port: u16,
    pub path: String,
    pub tls: bool,
    pub certificate_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Provisioning Progress
// ============================================================================

/// Stage reached by a provisioning pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStage {
    Verification,
    CertificateIssuance,
    ProxyReload,
    Complete,
}

impl ProvisioningStage {
    /// Wire representation of the stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::CertificateIssuance => "certificate_issuance",
            Self::ProxyReload => "proxy_reload",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pollable record of one pipeline run. Not persisted.
///
/// A run has ended when `finished` is set; it ended in error when `error` is set,
/// in which case `stage` names the stage that failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningProgress {
    pub domain: String,
    pub route_id: Option<Uuid>,
    pub stage: ProvisioningStage,
    pub domain_verified: bool,
    pub certificate_issued: bool,
    pub proxy_reloaded: bool,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub message: String,
    pub error: Option<String>,
    pub finished: bool,
}

impl ProvisioningProgress {
    /// Progress record for a run that is about to start.
    #[must_use]
    pub fn new(domain: &str, route_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            domain: domain.to_string(),
            route_id,
            stage: ProvisioningStage::Verification,
            domain_verified: false,
            certificate_issued: false,
            proxy_reloaded: false,
            started_at: now,
            last_update: now,
            message: "Provisioning scheduled".to_string(),
            error: None,
            finished: false,
        }
    }

    /// Record a step at `stage`.
    pub fn update(&mut self, stage: ProvisioningStage, message: impl Into<String>) {
        self.stage = stage;
        self.message = message.into();
        self.last_update = Utc::now();
    }

    /// End the run in error at the current stage.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.message = format!("Provisioning failed at {}: {error}", self.stage);
        self.error = Some(error);
        self.finished = true;
        self.last_update = Utc::now();
    }

    /// End the run successfully.
    pub fn complete(&mut self, message: impl Into<String>) {
        self.update(ProvisioningStage::Complete, message);
        self.finished = true;
    }

    /// Whether the run ended in error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod models_tests;
