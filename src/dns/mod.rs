// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS inspection and zone detection.
//!
//! Two narrow interfaces are consumed by the domain state machine:
//!
//! - [`DnsInspector`] resolves TXT records through one or more recursive resolvers
//! - [`ZoneDetector`] finds the zone apex of a domain and the provider hosting it
//!
//! [`hickory::HickoryDns`] implements both with `hickory-client`.

pub mod hickory;

use crate::constants::{CLOUDFLARE_NAMESERVER_SUFFIX, PROVIDER_CLOUDFLARE, PROVIDER_UNKNOWN};
use crate::errors::DnsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Resolves TXT records.
#[async_trait]
pub trait DnsInspector: Send + Sync {
    /// All TXT strings published at `name`. An absent name yields an empty list.
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;
}

/// Where a domain's zone lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    /// Provider name (e.g., "cloudflare"), or "unknown"
    pub provider: String,
    /// Zone apex
    pub zone: String,
}

/// Determines which provider authoritatively hosts a domain's zone.
#[async_trait]
pub trait ZoneDetector: Send + Sync {
    async fn get_zone_info(&self, domain: &str) -> Result<ZoneInfo, DnsError>;
}

/// Candidate zone apexes for a domain, most specific first.
///
/// Stops at two labels; TLDs are never returned.
///
/// ```rust
/// use glinr_edge::dns::candidate_zones;
///
/// assert_eq!(
///     candidate_zones("app.example.com"),
///     vec!["app.example.com", "example.com"]
/// );
/// ```
#[must_use]
pub fn candidate_zones(domain: &str) -> Vec<String> {
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    if labels.len() < 2 {
        return Vec::new();
    }
    (0..=labels.len() - 2)
        .map(|i| labels[i..].join("."))
        .collect()
}

/// Classify a provider from the zone's nameserver host names.
#[must_use]
pub fn classify_nameservers(nameservers: &[String]) -> &'static str {
    let is_cloudflare = !nameservers.is_empty()
        && nameservers.iter().all(|ns| {
            ns.trim_end_matches('.')
                .to_ascii_lowercase()
                .ends_with(CLOUDFLARE_NAMESERVER_SUFFIX)
        });
    if is_cloudflare {
        PROVIDER_CLOUDFLARE
    } else {
        PROVIDER_UNKNOWN
    }
}
