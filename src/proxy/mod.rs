// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reverse-proxy configuration rendering and control.
//!
//! The proxy configuration is always rebuilt in full from a [`RoutingSnapshot`]:
//!
//! - A default server answers unknown hosts with 404
//! - Every domain gets an HTTP server with one `location` per route
//! - Domains with a servable certificate also get an HTTPS server; their TLS
//!   routes redirect from HTTP to HTTPS
//!
//! Rendering is deterministic: the same snapshot always yields byte-identical
//! output, so redundant reconciles are harmless.
//!
//! [`ProxyControl`] validates and applies a rendered configuration;
//! [`nginx::NginxControl`] drives a local nginx.

pub mod nginx;

use crate::acme::CertificatePaths;
use crate::constants::PROXY_CONFIG_HEADER;
use crate::errors::ProxyError;
use crate::models::Route;
use crate::store::RoutingSnapshot;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Validate and apply proxy configuration.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Check `config` without touching the live configuration.
    async fn validate(&self, config: &str) -> Result<(), ProxyError>;

    /// Replace the live configuration with `config` and reload the proxy.
    async fn apply(&self, config: &str) -> Result<(), ProxyError>;
}

/// Output of [`ConfigRenderer::render`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedConfig {
    pub text: String,
    /// Routes rendered
    pub routes: usize,
    /// Routes served over HTTPS
    pub tls_routes: usize,
}

/// Renders a standalone nginx configuration.
#[derive(Clone, Debug)]
pub struct ConfigRenderer {
    pub cert_dir: PathBuf,
    pub http_port: u16,
    pub https_port: u16,
}

impl ConfigRenderer {
    /// Whether `route` can be served over HTTPS in this snapshot.
    ///
    /// Requires TLS, an attached certificate for the same domain, and that the
    /// certificate has been issued.
    #[must_use]
    pub fn is_tls_servable(route: &Route, snapshot: &RoutingSnapshot) -> bool {
        route.tls
            && route
                .certificate_id
                .and_then(|id| snapshot.certificate(id))
                .is_some_and(|cert| cert.domain == route.domain && cert.status.is_servable())
    }

    /// Render the complete configuration for `snapshot`.
    #[must_use]
    pub fn render(&self, snapshot: &RoutingSnapshot) -> RenderedConfig {
        let mut by_domain: BTreeMap<&str, Vec<&Route>> = BTreeMap::new();
        for route in &snapshot.routes {
            by_domain
                .entry(route.domain.as_str())
                .or_default()
                .push(route);
        }

        let mut out = String::new();
        let mut tls_routes = 0;

        let _ = writeln!(out, "{PROXY_CONFIG_HEADER}");
        out.push_str("worker_processes auto;\n\n");
        out.push_str("events {\n    worker_connections 1024;\n}\n\n");
        out.push_str("http {\n");
        out.push_str("    server_tokens off;\n");
        out.push_str("    client_max_body_size 64m;\n\n");

        let _ = writeln!(out, "    server {{");
        let _ = writeln!(out, "        listen {} default_server;", self.http_port);
        let _ = writeln!(out, "        server_name _;");
        let _ = writeln!(out, "        return 404;");
        let _ = writeln!(out, "    }}");

        for (domain, routes) in &by_domain {
            let mut routes = routes.clone();
            routes.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));
            let secure: Vec<&Route> = routes
                .iter()
                .copied()
                .filter(|r| Self::is_tls_servable(r, snapshot))
                .collect();
            tls_routes += secure.len();

            let _ = writeln!(out, "\n    # {domain}");
            let _ = writeln!(out, "    server {{");
            let _ = writeln!(out, "        listen {};", self.http_port);
            let _ = writeln!(out, "        server_name {domain};");
            for route in &routes {
                if secure.iter().any(|s| s.id == route.id) {
                    let _ = writeln!(out, "\n        location {} {{", route.path);
                    let _ = writeln!(out, "            return 301 https://$host$request_uri;");
                    let _ = writeln!(out, "        }}");
                } else {
                    write_location(&mut out, route);
                }
            }
            let _ = writeln!(out, "    }}");

            if !secure.is_empty() {
                let paths = CertificatePaths::for_domain(&self.cert_dir, domain);
                let _ = writeln!(out, "\n    server {{");
                let _ = writeln!(out, "        listen {} ssl;", self.https_port);
                let _ = writeln!(out, "        http2 on;");
                let _ = writeln!(out, "        server_name {domain};");
                let _ = writeln!(out, "        ssl_certificate {};", paths.chain.display());
                let _ = writeln!(out, "        ssl_certificate_key {};", paths.key.display());
                let _ = writeln!(out, "        ssl_protocols TLSv1.2 TLSv1.3;");
                for route in &secure {
                    write_location(&mut out, route);
                }
                let _ = writeln!(out, "    }}");
            }
        }

        out.push_str("}\n");

        RenderedConfig {
            text: out,
            routes: snapshot.routes.len(),
            tls_routes,
        }
    }
}

fn write_location(out: &mut String, route: &Route) {
    let _ = writeln!(out, "\n        location {} {{", route.path);
    let _ = writeln!(
        out,
        "            proxy_pass http://{}:{};",
        route.service_id, route.port
    );
    out.push_str("            proxy_http_version 1.1;\n");
    out.push_str("            proxy_set_header Host $host;\n");
    out.push_str("            proxy_set_header X-Real-IP $remote_addr;\n");
    out.push_str("            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
    out.push_str("            proxy_set_header X-Forwarded-Proto $scheme;\n");
    out.push_str("            proxy_set_header Upgrade $http_upgrade;\n");
    out.push_str("            proxy_set_header Connection \"upgrade\";\n");
    out.push_str("        }\n");
}

#[derive(Default)]
struct ServerBlock {
    line: usize,
    listen: bool,
    ssl: bool,
    certificate: bool,
    certificate_key: bool,
}

/// Structural checks on a rendered configuration.
///
/// Catches what would make nginx refuse the file: unbalanced braces, statements
/// without a terminating `;`, `server` blocks without `listen`, and TLS servers
/// without certificate paths.
///
/// # Errors
///
/// Returns [`ProxyError::Validation`] naming the first problem and its line.
pub fn lint_config(config: &str) -> Result<(), ProxyError> {
    let invalid = |reason: String| ProxyError::Validation { reason };

    let mut depth = 0usize;
    let mut server: Option<(usize, ServerBlock)> = None;

    for (index, raw) in config.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if !(line.ends_with(';') || line.ends_with('{') || line.ends_with('}')) {
            return Err(invalid(format!("line {line_no}: missing ';' after '{line}'")));
        }

        if line.starts_with("server ") && line.ends_with('{') && server.is_none() {
            server = Some((
                depth,
                ServerBlock {
                    line: line_no,
                    ..ServerBlock::default()
                },
            ));
        } else if let Some((_, block)) = server.as_mut() {
            if line.starts_with("listen ") {
                block.listen = true;
                block.ssl |= line.split_whitespace().any(|w| w.trim_end_matches(';') == "ssl");
            } else if line.starts_with("ssl_certificate_key ") {
                block.certificate_key = true;
            } else if line.starts_with("ssl_certificate ") {
                block.certificate = true;
            }
        }

        depth += line.matches('{').count();
        let closes = line.matches('}').count();
        if closes > depth {
            return Err(invalid(format!("line {line_no}: unexpected '}}'")));
        }
        depth -= closes;

        if let Some((open_depth, block)) = &server {
            if depth == *open_depth {
                if !block.listen {
                    return Err(invalid(format!(
                        "server block at line {} has no listen directive",
                        block.line
                    )));
                }
                if block.ssl && !(block.certificate && block.certificate_key) {
                    return Err(invalid(format!(
                        "TLS server block at line {} is missing certificate paths",
                        block.line
                    )));
                }
                server = None;
            }
        }
    }

    if depth != 0 {
        return Err(invalid(format!("{depth} unclosed block(s)")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
