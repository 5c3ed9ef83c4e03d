// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider clients.
//!
//! A [`ProviderClient`] creates or updates records in a zone the platform has
//! credentials for. All writes are *ensure* operations: calling them again with
//! the same arguments is a no-op that returns the existing record id.
//!
//! Providers are looked up by the name the zone detector reports through a
//! [`ProviderRegistry`]; a missing entry means no credentials are configured.

pub mod cloudflare;

use crate::errors::ProviderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Record management for one DNS provider account.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name as reported by zone detection (e.g., "cloudflare").
    fn name(&self) -> &str;

    /// Resolve a zone apex to the provider's zone identifier.
    async fn get_zone_id(&self, zone: &str) -> Result<String, ProviderError>;

    /// Ensure a TXT record with `value` exists at `name`. Returns the record id.
    async fn ensure_txt(&self, zone_id: &str, name: &str, value: &str)
        -> Result<String, ProviderError>;

    /// Ensure a record of `record_type` at `name` points at `value`. Returns the record id.
    async fn ensure_record(
        &self,
        zone_id: &str,
        record_type: &str,
        name: &str,
        value: &str,
        proxied: bool,
    ) -> Result<String, ProviderError>;
}

/// Provider clients keyed by provider name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own name, replacing any previous one.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    /// Client for `provider`, if credentials are configured.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(provider).cloned()
    }

    /// Names of all configured providers, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}
