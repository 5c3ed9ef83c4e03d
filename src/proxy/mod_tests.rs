// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::errors::ProxyError;
    use crate::models::{Certificate, CertificateStatus, Route};
    use crate::proxy::{lint_config, ConfigRenderer};
    use crate::store::RoutingSnapshot;
    use chrono::Utc;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn renderer() -> ConfigRenderer {
        ConfigRenderer {
            cert_dir: PathBuf::from("/certs"),
            http_port: 80,
            https_port: 443,
        }
    }

    fn route(domain: &str, path: &str, tls: bool, certificate_id: Option<Uuid>) -> Route {
        Route {
            id: Uuid::new_v4(),
            service_id: "web".to_string(),
            domain: domain.to_string(),
            port: 3000,
            path: path.to_string(),
            tls,
            certificate_id,
            created_at: Utc::now(),
        }
    }

    fn certificate(domain: &str, status: CertificateStatus) -> Certificate {
        let mut cert = Certificate::queued(domain, "ops@example.com");
        cert.status = status;
        cert
    }

    #[test]
    fn test_empty_snapshot_renders_valid_config() {
        let rendered = renderer().render(&RoutingSnapshot::default());

        assert_eq!(rendered.routes, 0);
        assert_eq!(rendered.tls_routes, 0);
        assert!(rendered.text.contains("listen 80 default_server;"));
        assert!(rendered.text.contains("return 404;"));
        lint_config(&rendered.text).unwrap();
    }

    #[test]
    fn test_plain_route_renders_proxy_location() {
        let snapshot = RoutingSnapshot {
            routes: vec![route("example.com", "/", false, None)],
            certificates: vec![],
        };

        let rendered = renderer().render(&snapshot);

        assert!(rendered.text.contains("server_name example.com;"));
        assert!(rendered.text.contains("proxy_pass http://web:3000;"));
        assert!(!rendered.text.contains("ssl_certificate"));
        lint_config(&rendered.text).unwrap();
    }

    #[test]
    fn test_issued_certificate_enables_https_and_redirect() {
        let cert = certificate("example.com", CertificateStatus::Issued);
        let snapshot = RoutingSnapshot {
            routes: vec![route("example.com", "/", true, Some(cert.id))],
            certificates: vec![cert],
        };

        let rendered = renderer().render(&snapshot);

        assert_eq!(rendered.tls_routes, 1);
        assert!(rendered.text.contains("listen 443 ssl;"));
        assert!(rendered
            .text
            .contains("ssl_certificate /certs/example.com/fullchain.pem;"));
        assert!(rendered
            .text
            .contains("ssl_certificate_key /certs/example.com/privkey.pem;"));
        assert!(rendered
            .text
            .contains("return 301 https://$host$request_uri;"));
        lint_config(&rendered.text).unwrap();
    }

    #[test]
    fn test_tls_route_without_servable_certificate_stays_http() {
        let queued = certificate("example.com", CertificateStatus::Queued);
        let foreign = certificate("other.com", CertificateStatus::Issued);
        let snapshot = RoutingSnapshot {
            routes: vec![
                route("example.com", "/", true, None),
                route("example.com", "/queued", true, Some(queued.id)),
                route("example.com", "/foreign", true, Some(foreign.id)),
            ],
            certificates: vec![queued, foreign],
        };

        let rendered = renderer().render(&snapshot);

        assert_eq!(rendered.tls_routes, 0);
        assert!(!rendered.text.contains("listen 443"));
        lint_config(&rendered.text).unwrap();
    }

    #[test]
    fn test_renewing_certificate_keeps_serving() {
        let cert = certificate("example.com", CertificateStatus::Renewing);
        let snapshot = RoutingSnapshot {
            routes: vec![route("example.com", "/", true, Some(cert.id))],
            certificates: vec![cert],
        };

        assert_eq!(renderer().render(&snapshot).tls_routes, 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let cert = certificate("a.example.com", CertificateStatus::Issued);
        let routes = vec![
            route("b.example.com", "/", false, None),
            route("a.example.com", "/api", true, Some(cert.id)),
            route("a.example.com", "/", true, Some(cert.id)),
        ];
        let forward = RoutingSnapshot {
            routes: routes.clone(),
            certificates: vec![cert.clone()],
        };
        let mut reversed_routes = routes;
        reversed_routes.reverse();
        let reversed = RoutingSnapshot {
            routes: reversed_routes,
            certificates: vec![cert],
        };

        let a = renderer().render(&forward);
        let b = renderer().render(&reversed);

        assert_eq!(a, b);
        let a_pos = a.text.find("server_name a.example.com;").unwrap();
        let b_pos = a.text.find("server_name b.example.com;").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn test_lint_rejects_unbalanced_braces() {
        let result = lint_config("http {\n    server {\n        listen 80;\n    }\n");
        assert!(matches!(result, Err(ProxyError::Validation { .. })));

        let result = lint_config("events {\n}\n}\n");
        assert!(matches!(result, Err(ProxyError::Validation { .. })));
    }

    #[test]
    fn test_lint_rejects_missing_semicolon() {
        let result = lint_config("http {\n    server_tokens off\n}\n");
        match result {
            Err(ProxyError::Validation { reason }) => assert!(reason.contains("line 2")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_lint_rejects_server_without_listen() {
        let result = lint_config("http {\n    server {\n        server_name x;\n    }\n}\n");
        assert!(matches!(result, Err(ProxyError::Validation { .. })));
    }

    #[test]
    fn test_lint_rejects_tls_server_without_certificate() {
        let config = "http {\n    server {\n        listen 443 ssl;\n        ssl_certificate /c.pem;\n    }\n}\n";
        let result = lint_config(config);
        match result {
            Err(ProxyError::Validation { reason }) => {
                assert!(reason.contains("missing certificate paths"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
