// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the provisioning core.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Domain Verification Constants
// ============================================================================

/// Label prepended to a domain to form its ownership challenge record
pub const VERIFICATION_RECORD_PREFIX: &str = "_glinr-verify";

/// Record type used for ownership challenges
pub const VERIFICATION_RECORD_TYPE: &str = "TXT";

/// Number of random bytes in a verification token (encoded as 43 base64url chars)
pub const VERIFICATION_TOKEN_BYTES: usize = 32;

/// Maximum length of a fully qualified domain name
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length of a single DNS label
pub const MAX_LABEL_LENGTH: usize = 63;

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Recursive resolvers queried when none are configured
pub const DEFAULT_DNS_RESOLVERS: &[&str] = &["1.1.1.1:53", "8.8.8.8:53"];

/// Default timeout for a single DNS query (10 seconds)
pub const DEFAULT_DNS_TIMEOUT_SECS: u64 = 10;

/// TTL used for records written through a provider (Cloudflare "automatic" = 1)
pub const PROVIDER_RECORD_TTL: u32 = 1;

/// Provider name reported for zones hosted on Cloudflare
pub const PROVIDER_CLOUDFLARE: &str = "cloudflare";

/// Provider name reported when the nameservers match no supported provider
pub const PROVIDER_UNKNOWN: &str = "unknown";

/// Nameserver suffix identifying Cloudflare-hosted zones
pub const CLOUDFLARE_NAMESERVER_SUFFIX: &str = ".ns.cloudflare.com";

/// Default Cloudflare v4 API base URL
pub const CLOUDFLARE_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default timeout for provider API requests (30 seconds)
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Provisioning Pipeline Constants
// ============================================================================

/// Number of verification checks before a pipeline run gives up
pub const VERIFICATION_ATTEMPTS: u32 = 5;

/// Linear backoff step between verification checks (attempt i waits i x step)
pub const VERIFICATION_BACKOFF_STEP_SECS: u64 = 10;

// ============================================================================
// Certificate Lifecycle Constants
// ============================================================================

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETSENCRYPT_STAGING_URL: &str =
    "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Default directory holding issued certificates and the ACME account
pub const DEFAULT_CERT_DIR: &str = "/etc/glinr-edge/certs";

/// Default wait between publishing an ACME challenge and asking for validation (15 seconds)
pub const DEFAULT_ACME_PROPAGATION_DELAY_SECS: u64 = 15;

/// Label used for ACME DNS-01 challenge records
pub const ACME_CHALLENGE_RECORD_PREFIX: &str = "_acme-challenge";

/// Default timeout for a complete ACME issuance (60 seconds)
pub const DEFAULT_CA_TIMEOUT_SECS: u64 = 60;

/// Default lead time before expiry at which certificates are renewed (30 days)
pub const DEFAULT_RENEW_BEFORE_DAYS: i64 = 30;

/// Default interval between renewal sweeps (12 hours)
pub const DEFAULT_RENEWAL_CHECK_INTERVAL_SECS: u64 = 12 * 3600;

/// Minimum interval between renewal sweeps (1 minute)
pub const MIN_RENEWAL_CHECK_INTERVAL_SECS: u64 = 60;

/// Certificates renewed in parallel during one sweep
pub const RENEWAL_CONCURRENCY: usize = 4;

/// Certificate chain file name inside a domain's certificate directory
pub const CERT_CHAIN_FILE: &str = "fullchain.pem";

/// Private key file name inside a domain's certificate directory
pub const CERT_KEY_FILE: &str = "privkey.pem";

/// ACME account credentials file name inside the certificate directory
pub const ACME_ACCOUNT_FILE: &str = "account.json";

// ============================================================================
// Proxy Constants
// ============================================================================

/// Default path of the live proxy configuration
pub const DEFAULT_PROXY_CONFIG_PATH: &str = "/etc/nginx/nginx.conf";

/// Default HTTP listen port of the proxy
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS listen port of the proxy
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default timeout for proxy validate/reload commands (30 seconds)
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 30;

/// Placeholder replaced by the candidate file path in the validate command
pub const PROXY_CONFIG_PLACEHOLDER: &str = "{config}";

/// First line of every generated proxy configuration
pub const PROXY_CONFIG_HEADER: &str = "# Generated by glinr-edge. Manual edits are overwritten.";

// ============================================================================
// Status Server Constants
// ============================================================================

/// Default CNAME target for customer subdomains
pub const DEFAULT_EDGE_HOST: &str = "edge.glinr.io";

/// Default bind address of the status HTTP server
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9090";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";

/// Path for provisioning progress lookups
pub const PROVISIONING_SERVER_PATH: &str = "/provisioning/{domain}";

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "GLINR_EDGE_CONFIG";

/// Environment variable overriding the Cloudflare API token
pub const CLOUDFLARE_API_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
