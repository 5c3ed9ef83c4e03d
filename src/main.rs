// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use glinr_edge::{
    acme::client::AcmeAuthority,
    config::Config,
    constants::{
        CLOUDFLARE_API_TOKEN_ENV, CONFIG_PATH_ENV, HEALTH_SERVER_PATH, METRICS_SERVER_PATH,
        PROVISIONING_SERVER_PATH, TOKIO_WORKER_THREADS,
    },
    dns::hickory::HickoryDns,
    locks::KeyedLocks,
    metrics,
    platform::Platform,
    provider::{cloudflare::CloudflareClient, ProviderRegistry},
    reconcilers::{
        CertificateManager, DomainVerifier, ProgressBoard, ProvisioningPipeline, ProxyReconciler,
        RenewalScheduler,
    },
    status_reasons::REASON_NOT_FOUND,
    store::{MemoryStore, Store},
};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Custom domain provisioning daemon.
#[derive(Debug, Parser)]
#[command(name = "glinr-edge", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Cloudflare API token, overriding the configuration file
    #[arg(long, env = CLOUDFLARE_API_TOKEN_ENV, hide_env_values = true)]
    cloudflare_api_token: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("glinr-edge")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

/// Format: timestamp file:line LEVEL message. `RUST_LOG` sets the filter
/// (default `info`), `RUST_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

fn load_config(cli: Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };
    config.apply_overrides(cli.cloudflare_api_token);
    config.validate().context("validating configuration")?;
    Ok(config)
}

async fn async_main(cli: Cli) -> Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting glinr-edge");

    let config = load_config(cli)?;
    debug!(config = ?config, "Configuration loaded");

    let listen: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("parsing listen address {}", config.listen))?;

    // Persistence is owned by the API layer; the daemon keeps its own rows
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let row_locks = Arc::new(KeyedLocks::new());

    let dns = Arc::new(
        HickoryDns::new(
            config.dns.resolvers.clone(),
            Duration::from_secs(config.dns.timeout_secs),
        )
        .context("creating DNS client")?,
    );

    let mut providers = ProviderRegistry::new();
    if let Some(token) = config.providers.cloudflare.token() {
        let client = CloudflareClient::with_base_url(
            token,
            &config.providers.cloudflare.base_url,
            Duration::from_secs(config.providers.cloudflare.timeout_secs),
        )
        .context("creating Cloudflare client")?;
        providers.register(Arc::new(client));
        info!("Cloudflare provider enabled");
    } else {
        warn!("No DNS provider credentials configured; challenges must be published manually");
    }

    let authority = Arc::new(AcmeAuthority::new(
        config.acme.directory_url().to_string(),
        config.acme.cert_dir.clone(),
        Duration::from_secs(config.acme.propagation_delay_secs),
        dns.clone(),
        providers.clone(),
    ));
    info!(
        directory_url = %config.acme.directory_url(),
        cert_dir = %config.acme.cert_dir.display(),
        "ACME authority configured"
    );

    let domains = Arc::new(DomainVerifier::new(
        store.clone(),
        row_locks.clone(),
        dns.clone(),
        dns,
        providers,
        config.edge_host.clone(),
    ));
    let certificates = Arc::new(CertificateManager::new(
        store.clone(),
        row_locks,
        authority,
        Duration::from_secs(config.acme.timeout_secs),
    ));
    let reconciler = Arc::new(ProxyReconciler::new(
        store.clone(),
        config.renderer(),
        Arc::new(config.nginx_control()),
    ));
    let pipeline = Arc::new(ProvisioningPipeline::new(
        store.clone(),
        domains.clone(),
        certificates.clone(),
        reconciler.clone(),
        Arc::new(ProgressBoard::new()),
        config.pipeline_settings(),
    ));
    let platform = Arc::new(Platform::new(
        store,
        domains,
        certificates.clone(),
        reconciler.clone(),
        pipeline,
    ));
    let renewal = Arc::new(RenewalScheduler::new(
        certificates,
        reconciler,
        chrono::Duration::days(config.renewal.renew_before_days),
        Duration::from_secs(config.renewal.check_interval_secs),
    ));

    // Bring the proxy in line with the store before serving
    match platform.reconcile().await {
        Ok(report) => info!(config_hash = %report.config_hash, "Initial proxy configuration applied"),
        Err(e) => warn!(error = %e, "Initial proxy reconcile failed, will retry on the next change"),
    }

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding status server to {listen}"))?;
    info!(address = %listen, "Status server listening");
    let app = status_router(platform);

    // Background tasks should never exit; if one does, the daemon exits too
    tokio::select! {
        () = renewal.run() => {
            error!("CRITICAL: renewal scheduler exited unexpectedly");
            anyhow::bail!("renewal scheduler exited unexpectedly")
        }
        result = axum::serve(listener, app) => {
            error!("CRITICAL: status server exited unexpectedly: {:?}", result);
            result.context("status server failed")?;
            anyhow::bail!("status server exited unexpectedly without error")
        }
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for shutdown signal")?;
            info!("Shutdown signal received, stopping");
            Ok(())
        }
    }
}

fn status_router(platform: Arc<Platform>) -> Router {
    Router::new()
        .route(HEALTH_SERVER_PATH, get(healthz))
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(PROVISIONING_SERVER_PATH, get(provisioning_handler))
        .with_state(platform)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn provisioning_handler(
    State(platform): State<Arc<Platform>>,
    UrlPath(domain): UrlPath<String>,
) -> Response {
    match platform.provisioning(&domain) {
        Some(progress) => Json(progress).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": 404,
                "reason": REASON_NOT_FOUND,
                "message": format!("No provisioning run recorded for '{domain}'"),
            })),
        )
            .into_response(),
    }
}
