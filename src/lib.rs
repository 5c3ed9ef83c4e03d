// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # glinr-edge - Custom Domain Provisioning Core
//!
//! glinr-edge takes a customer domain from "just registered" to "served over
//! HTTPS by the edge proxy": it proves DNS ownership with a TXT challenge,
//! issues and renews certificates through ACME, and keeps the proxy
//! configuration in sync with the stored routes and certificates.
//!
//! ## Overview
//!
//! ```text
//! pending ──▶ verifying ──▶ verified ──▶ active
//!    ▲             │             │
//!    └── reset ── error ◀────────┘
//! ```
//!
//! - A domain is registered `pending` with a random verification token
//! - Issuing the challenge moves it to `verifying`; the user (or the DNS
//!   provider, when the zone is managed) publishes `_glinr-verify.<domain>`
//! - A matching TXT lookup moves it to `verified`
//! - Once a certificate is issued and the proxy reloaded it becomes `active`
//!
//! ## Modules
//!
//! - [`models`] - Domain, Certificate, Route and progress records
//! - [`store`] - Persistence trait and in-memory implementation
//! - [`dns`] - TXT lookups and zone detection
//! - [`provider`] - DNS provider APIs (Cloudflare)
//! - [`acme`] - Certificate authority (ACME DNS-01)
//! - [`proxy`] - nginx configuration rendering and control
//! - [`reconcilers`] - Verification, issuance, reconcile, pipeline, routes, renewal
//! - [`platform`] - Operations exposed to the API layer
//! - [`config`] - Daemon configuration
//!
//! ## Example
//!
//! ```rust
//! use glinr_edge::models::{challenge_record_name, normalize_domain_name};
//!
//! let name = normalize_domain_name("Example.COM.").unwrap();
//! assert_eq!(name, "example.com");
//! assert_eq!(challenge_record_name(&name), "_glinr-verify.example.com");
//! ```

pub mod acme;
pub mod config;
pub mod constants;
pub mod dns;
pub mod errors;
pub mod fsutil;
pub mod http_errors;
pub mod locks;
pub mod metrics;
pub mod models;
pub mod platform;
pub mod provider;
pub mod proxy;
pub mod reconcilers;
pub mod status_reasons;
pub mod store;

#[cfg(test)]
pub mod test_support;
