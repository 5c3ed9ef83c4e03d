// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Daemon configuration.
//!
//! Loaded from a YAML file. Every field has a default, so an empty file (or no
//! file at all) yields a working development configuration.
//!
//! # Example
//!
//! ```yaml
//! listen: 0.0.0.0:9090
//! edge_host: edge.glinr.io
//! dns:
//!   resolvers: ["1.1.1.1:53"]
//! providers:
//!   cloudflare:
//!     api_token: "..."
//! acme:
//!   staging: true
//!   email: ops@example.com
//! proxy:
//!   config_path: /etc/nginx/nginx.conf
//! pipeline:
//!   verification_attempts: 5
//!   backoff_step_secs: 10
//! renewal:
//!   renew_before_days: 30
//! ```

use crate::constants::{
    CLOUDFLARE_API_BASE_URL, DEFAULT_ACME_PROPAGATION_DELAY_SECS, DEFAULT_CA_TIMEOUT_SECS,
    DEFAULT_CERT_DIR, DEFAULT_DNS_RESOLVERS, DEFAULT_DNS_TIMEOUT_SECS, DEFAULT_EDGE_HOST,
    DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT, DEFAULT_LISTEN_ADDRESS, DEFAULT_PROVIDER_TIMEOUT_SECS,
    DEFAULT_PROXY_CONFIG_PATH, DEFAULT_PROXY_TIMEOUT_SECS, DEFAULT_RENEWAL_CHECK_INTERVAL_SECS,
    DEFAULT_RENEW_BEFORE_DAYS, LETSENCRYPT_PRODUCTION_URL, LETSENCRYPT_STAGING_URL,
    MIN_RENEWAL_CHECK_INTERVAL_SECS, PROXY_CONFIG_PLACEHOLDER, VERIFICATION_ATTEMPTS,
    VERIFICATION_BACKOFF_STEP_SECS,
};
use crate::errors::ConfigError;
use crate::models::normalize_domain_name;
use crate::proxy::nginx::NginxControl;
use crate::proxy::ConfigRenderer;
use crate::reconcilers::certificate::is_valid_email;
use crate::reconcilers::pipeline::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Status server bind address
    pub listen: String,
    /// CNAME target published for non-apex customer domains
    pub edge_host: String,
    pub dns: DnsConfig,
    pub providers: ProvidersConfig,
    pub acme: AcmeConfig,
    pub proxy: ProxyConfig,
    pub pipeline: PipelineConfig,
    pub renewal: RenewalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDRESS.to_string(),
            edge_host: DEFAULT_EDGE_HOST.to_string(),
            dns: DnsConfig::default(),
            providers: ProvidersConfig::default(),
            acme: AcmeConfig::default(),
            proxy: ProxyConfig::default(),
            pipeline: PipelineConfig::default(),
            renewal: RenewalConfig::default(),
        }
    }
}

/// Recursive resolvers used for challenge lookups and zone detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub resolvers: Vec<SocketAddr>,
    pub timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolvers: DEFAULT_DNS_RESOLVERS
                .iter()
                .filter_map(|r| r.parse().ok())
                .collect(),
            timeout_secs: DEFAULT_DNS_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub cloudflare: CloudflareConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudflareConfig {
    /// Without a token the provider is not registered and DNS is manual
    pub api_token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: CLOUDFLARE_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}

impl CloudflareConfig {
    /// The token, if one is set and non-blank.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcmeConfig {
    /// Use the Let's Encrypt staging directory
    pub staging: bool,
    /// Explicit directory URL; overrides `staging`
    pub directory_url: Option<String>,
    pub cert_dir: PathBuf,
    /// Contact used when a request names none
    pub email: Option<String>,
    pub timeout_secs: u64,
    pub propagation_delay_secs: u64,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            staging: false,
            directory_url: None,
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            email: None,
            timeout_secs: DEFAULT_CA_TIMEOUT_SECS,
            propagation_delay_secs: DEFAULT_ACME_PROPAGATION_DELAY_SECS,
        }
    }
}

impl AcmeConfig {
    #[must_use]
    pub fn directory_url(&self) -> &str {
        match &self.directory_url {
            Some(url) => url,
            None if self.staging => LETSENCRYPT_STAGING_URL,
            None => LETSENCRYPT_PRODUCTION_URL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub config_path: PathBuf,
    /// `{config}` is replaced by the candidate file; empty disables validation
    pub validate_command: Vec<String>,
    /// Empty disables reloads
    pub reload_command: Vec<String>,
    pub http_port: u16,
    pub https_port: u16,
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_PROXY_CONFIG_PATH),
            validate_command: vec![
                "nginx".to_string(),
                "-t".to_string(),
                "-c".to_string(),
                PROXY_CONFIG_PLACEHOLDER.to_string(),
            ],
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            http_port: DEFAULT_HTTP_PORT,
            https_port: DEFAULT_HTTPS_PORT,
            timeout_secs: DEFAULT_PROXY_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub verification_attempts: u32,
    pub backoff_step_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verification_attempts: VERIFICATION_ATTEMPTS,
            backoff_step_secs: VERIFICATION_BACKOFF_STEP_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    pub check_interval_secs: u64,
    pub renew_before_days: i64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_RENEWAL_CHECK_INTERVAL_SECS,
            renew_before_days: DEFAULT_RENEW_BEFORE_DAYS,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn require_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}

impl Config {
    /// Parse YAML text. `source` names the origin in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or unknown shapes.
    pub fn from_yaml(text: &str, source: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: source.to_string(),
            reason: e.to_string(),
        })
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&text, &path.display().to_string())
    }

    /// Apply environment overrides. A set token replaces the file's token.
    pub fn apply_overrides(&mut self, cloudflare_api_token: Option<String>) {
        if let Some(token) = cloudflare_api_token.filter(|t| !t.trim().is_empty()) {
            self.providers.cloudflare.api_token = Some(token);
        }
    }

    /// Reject values the daemon cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen
            .parse::<SocketAddr>()
            .map_err(|e| invalid("listen", e.to_string()))?;
        normalize_domain_name(&self.edge_host).map_err(|e| invalid("edge_host", e.to_string()))?;

        if self.dns.resolvers.is_empty() {
            return Err(invalid("dns.resolvers", "at least one resolver is required"));
        }
        require_positive("dns.timeout_secs", self.dns.timeout_secs)?;
        require_positive(
            "providers.cloudflare.timeout_secs",
            self.providers.cloudflare.timeout_secs,
        )?;
        url::Url::parse(&self.providers.cloudflare.base_url)
            .map_err(|e| invalid("providers.cloudflare.base_url", e.to_string()))?;

        url::Url::parse(self.acme.directory_url())
            .map_err(|e| invalid("acme.directory_url", e.to_string()))?;
        require_positive("acme.timeout_secs", self.acme.timeout_secs)?;
        if let Some(email) = &self.acme.email {
            if !is_valid_email(email) {
                return Err(invalid("acme.email", format!("'{email}' is not an email address")));
            }
        }

        require_positive("proxy.timeout_secs", self.proxy.timeout_secs)?;
        if self.proxy.http_port == 0 || self.proxy.https_port == 0 {
            return Err(invalid("proxy.http_port", "ports must be non-zero"));
        }
        if self.proxy.http_port == self.proxy.https_port {
            return Err(invalid("proxy.https_port", "must differ from http_port"));
        }

        if self.pipeline.verification_attempts == 0 {
            return Err(invalid("pipeline.verification_attempts", "must be greater than zero"));
        }
        require_positive("pipeline.backoff_step_secs", self.pipeline.backoff_step_secs)?;

        if self.renewal.renew_before_days <= 0 {
            return Err(invalid("renewal.renew_before_days", "must be greater than zero"));
        }
        if self.renewal.check_interval_secs < MIN_RENEWAL_CHECK_INTERVAL_SECS {
            return Err(invalid(
                "renewal.check_interval_secs",
                format!("must be at least {MIN_RENEWAL_CHECK_INTERVAL_SECS}"),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            verification_attempts: self.pipeline.verification_attempts,
            backoff_step: Duration::from_secs(self.pipeline.backoff_step_secs),
            default_email: self.acme.email.clone(),
        }
    }

    #[must_use]
    pub fn renderer(&self) -> ConfigRenderer {
        ConfigRenderer {
            cert_dir: self.acme.cert_dir.clone(),
            http_port: self.proxy.http_port,
            https_port: self.proxy.https_port,
        }
    }

    #[must_use]
    pub fn nginx_control(&self) -> NginxControl {
        NginxControl {
            config_path: self.proxy.config_path.clone(),
            validate_command: self.proxy.validate_command.clone(),
            reload_command: self.proxy.reload_command.clone(),
            timeout: Duration::from_secs(self.proxy.timeout_secs),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
