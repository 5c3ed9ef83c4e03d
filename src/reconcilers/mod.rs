// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provisioning reconcilers.
//!
//! Each reconciler owns one kind of row and drives it through its lifecycle
//! against an external collaborator:
//!
//! - [`domain`] - Ownership verification and domain status
//! - [`certificate`] - Certificate issuance and renewal through the CA
//! - [`proxy`] - Full proxy configuration rebuilds
//! - [`pipeline`] - Background verify, issue, reconcile, activate runs
//! - [`routes`] - Route creation and deletion
//! - [`renewal`] - Periodic renewal of expiring certificates
//! - [`retry`] - Backoff policies for transient collaborator failures
//!
//! All reconcilers share one [`Store`](crate::store::Store). Mutations of the
//! same domain row are serialized through a shared
//! [`KeyedLocks`](crate::locks::KeyedLocks).

pub mod certificate;
pub mod domain;
pub mod pipeline;
pub mod proxy;
pub mod renewal;
pub mod retry;
pub mod routes;

pub use certificate::CertificateManager;
pub use domain::DomainVerifier;
pub use pipeline::{PipelineOptions, PipelineSettings, ProgressBoard, ProvisioningPipeline};
pub use proxy::ProxyReconciler;
pub use renewal::RenewalScheduler;
pub use routes::{RouteRequest, RouteService};
