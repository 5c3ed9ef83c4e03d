// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloudflare v4 REST API client.
//!
//! Records are managed with a list-then-write pattern:
//!
//! 1. List records of the requested type at the requested name
//! 2. A record already carrying the desired value is returned as-is
//! 3. Otherwise the first existing record is updated (`PUT`), or a new one created (`POST`)
//!
//! Transient failures (429, 5xx, connection errors, timeouts) are retried with
//! exponential backoff; other 4xx responses fail immediately.

use super::ProviderClient;
use crate::constants::{CLOUDFLARE_API_BASE_URL, PROVIDER_CLOUDFLARE, PROVIDER_RECORD_TTL};
use crate::errors::ProviderError;
use crate::http_errors::map_provider_status;
use crate::reconcilers::retry::{http_backoff, retry_with_backoff, PROVIDER_RETRY_BUDGET_SECS};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

/// Response envelope shared by all Cloudflare v4 endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

/// A DNS record as returned by Cloudflare.
#[derive(Clone, Debug, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare API client authenticated with an API token.
pub struct CloudflareClient {
    http: HttpClient,
    api_token: String,
    base_url: String,
    timeout: Duration,
    max_retry_elapsed: Duration,
    zone_cache: RwLock<HashMap<String, String>>,
}

impl CloudflareClient {
    /// Create a client against the public Cloudflare API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_token: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(api_token, CLOUDFLARE_API_BASE_URL, timeout)
    }

    /// Create a client against an alternative API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        api_token: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable {
                provider: PROVIDER_CLOUDFLARE.to_string(),
                endpoint: base_url.to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_token: api_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retry_elapsed: Duration::from_secs(PROVIDER_RETRY_BUDGET_SECS),
            zone_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Bound the total time spent retrying one request.
    #[must_use]
    pub fn with_max_retry_elapsed(mut self, max_retry_elapsed: Duration) -> Self {
        self.max_retry_elapsed = max_retry_elapsed;
        self
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let raw = format!("{}{path}", self.base_url);
        let parsed = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query)
        };
        parsed.map_err(|e| ProviderError::InvalidResponse {
            provider: PROVIDER_CLOUDFLARE.to_string(),
            endpoint: raw,
            reason: format!("invalid URL: {e}"),
        })
    }

    /// Execute a request with retry and unwrap the response envelope.
    async fn request<T, B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + Send,
        B: Serialize + Sync,
    {
        let operation_name = format!("{method} {}", url.path());
        retry_with_backoff(
            &operation_name,
            http_backoff(self.max_retry_elapsed),
            ProviderError::is_transient,
            || self.request_once(method.clone(), url.clone(), body),
        )
        .await
    }

    async fn request_once<T, B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + Send,
        B: Serialize + Sync,
    {
        let endpoint = url.to_string();
        debug!(method = %method, url = %endpoint, "Cloudflare API request");

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.api_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: PROVIDER_CLOUDFLARE.to_string(),
                    endpoint: endpoint.clone(),
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }
            } else {
                ProviderError::Unavailable {
                    provider: PROVIDER_CLOUDFLARE.to_string(),
                    endpoint: endpoint.clone(),
                    reason: format!("failed to send request: {e}"),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_provider_status(
                PROVIDER_CLOUDFLARE,
                &endpoint,
                status.as_u16(),
                &error_summary(&text),
            ));
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER_CLOUDFLARE.to_string(),
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        if !envelope.success {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_CLOUDFLARE.to_string(),
                endpoint,
                status: status.as_u16(),
                reason: join_messages(&envelope.errors),
            });
        }
        envelope.result.ok_or_else(|| ProviderError::InvalidResponse {
            provider: PROVIDER_CLOUDFLARE.to_string(),
            endpoint,
            reason: "response has no result".to_string(),
        })
    }

    /// Records of `record_type` at `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_records(
        &self,
        zone_id: &str,
        record_type: &str,
        name: &str,
    ) -> Result<Vec<DnsRecord>, ProviderError> {
        let url = self.endpoint(
            &format!("/zones/{zone_id}/dns_records"),
            &[("type", record_type), ("name", name)],
        )?;
        self.request::<Vec<DnsRecord>, ()>(Method::GET, url, None).await
    }
}

/// Cloudflare returns TXT content quoted on some accounts; compare unquoted.
fn content_matches(record: &DnsRecord, value: &str) -> bool {
    record.content.trim_matches('"') == value
}

fn join_messages(messages: &[ApiMessage]) -> String {
    if messages.is_empty() {
        return "request was not successful".to_string();
    }
    messages
        .iter()
        .map(|m| format!("{} ({})", m.message, m.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Best-effort extraction of the error messages from an error body.
fn error_summary(body: &str) -> String {
    serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .map(|envelope| join_messages(&envelope.errors))
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl ProviderClient for CloudflareClient {
    fn name(&self) -> &str {
        PROVIDER_CLOUDFLARE
    }

    async fn get_zone_id(&self, zone: &str) -> Result<String, ProviderError> {
        if let Some(zone_id) = self.zone_cache.read().await.get(zone) {
            return Ok(zone_id.clone());
        }

        let url = self.endpoint("/zones", &[("name", zone)])?;
        let zones: Vec<Zone> = self.request::<Vec<Zone>, ()>(Method::GET, url, None).await?;
        let found = zones
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(zone))
            .ok_or_else(|| ProviderError::ZoneNotFound {
                provider: PROVIDER_CLOUDFLARE.to_string(),
                zone: zone.to_string(),
            })?;

        debug!(zone = %zone, zone_id = %found.id, "Resolved Cloudflare zone");
        self.zone_cache
            .write()
            .await
            .insert(zone.to_string(), found.id.clone());
        Ok(found.id)
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
        zone_id: &str,
        record_type: &str,
        name: &str,
        value: &str,
        proxied: bool,
    ) -> Result<String, ProviderError> {
        let existing = self.list_records(zone_id, record_type, name).await?;

        if let Some(record) = existing
            .iter()
            .find(|r| content_matches(r, value) && r.proxied == proxied)
        {
            debug!(
                zone_id = %zone_id,
                record_type = %record_type,
                name = %name,
                record_id = %record.id,
                "Record already up to date"
            );
            return Ok(record.id.clone());
        }

        let body = RecordBody {
            record_type,
            name,
            content: value,
            ttl: PROVIDER_RECORD_TTL,
            proxied,
        };

        let record: DnsRecord = if let Some(current) = existing.first() {
            let url = self.endpoint(
                &format!("/zones/{zone_id}/dns_records/{}", current.id),
                &[],
            )?;
            info!(
                zone_id = %zone_id,
                record_type = %record_type,
                name = %name,
                record_id = %current.id,
                "Updating DNS record"
            );
            self.request(Method::PUT, url, Some(&body)).await?
        } else {
            let url = self.endpoint(&format!("/zones/{zone_id}/dns_records"), &[])?;
            info!(
                zone_id = %zone_id,
                record_type = %record_type,
                name = %name,
                "Creating DNS record"
            );
            self.request(Method::POST, url, Some(&body)).await?
        };

        Ok(record.id)
    }
}

#[cfg(test)]
#[path = "cloudflare_tests.rs"]
mod cloudflare_tests;
