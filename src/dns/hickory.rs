// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `hickory-client` implementation of [`DnsInspector`] and [`ZoneDetector`].
//!
//! Queries run on the blocking pool through `SyncClient` over UDP, one resolver
//! at a time in configured order. The first resolver that answers wins; the
//! last failure is returned when none does.

use super::{candidate_zones, classify_nameservers, DnsInspector, ZoneDetector, ZoneInfo};
use crate::errors::DnsError;
use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::op::ResponseCode;
use hickory_client::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_client::udp::UdpClientConnection;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// DNS client backed by a list of recursive resolvers.
#[derive(Clone, Debug)]
pub struct HickoryDns {
    resolvers: Vec<SocketAddr>,
    timeout: Duration,
}

impl HickoryDns {
    /// Create a client for the given resolvers.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::NoResolvers`] when the list is empty.
    pub fn new(resolvers: Vec<SocketAddr>, timeout: Duration) -> Result<Self, DnsError> {
        if resolvers.is_empty() {
            return Err(DnsError::NoResolvers);
        }
        Ok(Self { resolvers, timeout })
    }

    /// Query all resolvers in order until one answers.
    async fn query(&self, name: &str, record_type: RecordType) -> Result<Vec<Record>, DnsError> {
        let fqdn = Name::from_str(name).map_err(|e| DnsError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let mut last_error = DnsError::NoResolvers;
        for server in &self.resolvers {
            match self.query_server(&fqdn, record_type, *server).await {
                Ok(records) => return Ok(records),
                Err(e) => {
                    warn!(name = %name, server = %server, error = %e, "DNS resolver failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn query_server(
        &self,
        fqdn: &Name,
        record_type: RecordType,
        server: SocketAddr,
    ) -> Result<Vec<Record>, DnsError> {
        let name = fqdn.to_utf8();
        let timeout = self.timeout;
        let query_name = fqdn.clone();
        let query_failed = {
            let name = name.clone();
            move |reason: String| DnsError::QueryFailed {
                name: name.clone(),
                server: server.to_string(),
                reason,
            }
        };
        let task_failed = query_failed.clone();

        let task = tokio::task::spawn_blocking(move || {
            let conn = UdpClientConnection::with_timeout(server, timeout)
                .map_err(|e| query_failed(format!("failed to create UDP connection: {e}")))?;
            let client = SyncClient::new(conn);

            let response = client
                .query(&query_name, DNSClass::IN, record_type)
                .map_err(|e| query_failed(e.to_string()))?;

            match response.response_code() {
                ResponseCode::NoError | ResponseCode::NXDomain => Ok(response
                    .answers()
                    .iter()
                    .filter(|r| r.record_type() == record_type)
                    .cloned()
                    .collect()),
                code => Err(query_failed(format!("response code {code:?}"))),
            }
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => {
                debug!(name = %name, server = %server, record_type = ?record_type, "DNS query completed");
                result
            }
            Ok(Err(join_error)) => Err(task_failed(format!("query task failed: {join_error}"))),
            Err(_) => Err(DnsError::Timeout {
                name,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// TXT strings of the given records. Character-strings of one record are joined.
#[must_use]
pub fn txt_values(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::TXT(txt)) => Some(
                txt.txt_data()
                    .iter()
                    .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                    .collect::<String>(),
            ),
            _ => None,
        })
        .collect()
}

/// Nameserver host names of the given records.
#[must_use]
pub fn ns_values(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::NS(ns)) => Some(ns.0.to_utf8()),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl DnsInspector for HickoryDns {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let records = self.query(name, RecordType::TXT).await?;
        Ok(txt_values(&records))
    }
}

#[async_trait]
impl ZoneDetector for HickoryDns {
    async fn get_zone_info(&self, domain: &str) -> Result<ZoneInfo, DnsError> {
        for zone in candidate_zones(domain) {
            let records = self.query(&zone, RecordType::NS).await?;
            let nameservers = ns_values(&records);
            if nameservers.is_empty() {
                continue;
            }
            let provider = classify_nameservers(&nameservers);
            debug!(domain = %domain, zone = %zone, provider = %provider, nameservers = ?nameservers, "Detected zone");
            return Ok(ZoneInfo {
                provider: provider.to_string(),
                zone,
            });
        }
        Err(DnsError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "hickory_tests.rs"]
mod hickory_tests;
