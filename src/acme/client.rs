// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME certificate authority using DNS-01 challenges.
//!
//! # Issuance Flow
//!
//! 1. Load or create the ACME account for the contact email
//! 2. Detect the domain's zone and look up the provider client for it
//! 3. Create an order and publish `_acme-challenge.<domain>` through the provider
//! 4. Wait for propagation, mark the challenge ready, poll until the order is ready
//! 5. Finalize with a fresh key pair and CSR, download the chain
//! 6. Write `fullchain.pem` and `privkey.pem` atomically and report the expiry
//!
//! The whole flow is bounded by the caller's timeout.

use super::{
    acme_challenge_record_name, dns01_challenge_value, parse_certificate_expiry,
    CertificateAuthority, CertificatePaths, IssuedCertificate,
};
use crate::constants::ACME_ACCOUNT_FILE;
use crate::dns::ZoneDetector;
use crate::errors::CaError;
use crate::fsutil::atomic_write;
use crate::provider::{ProviderClient, ProviderRegistry};
use async_trait::async_trait;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Interval between order status polls
const ORDER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// ACME DNS-01 certificate authority.
pub struct AcmeAuthority {
    directory_url: String,
    cert_dir: PathBuf,
    propagation_delay: Duration,
    zones: Arc<dyn ZoneDetector>,
    providers: ProviderRegistry,
    accounts: Mutex<HashMap<String, Account>>,
}

impl AcmeAuthority {
    /// Create an authority against an ACME directory.
    #[must_use]
    pub fn new(
        directory_url: String,
        cert_dir: PathBuf,
        propagation_delay: Duration,
        zones: Arc<dyn ZoneDetector>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            directory_url,
            cert_dir,
            propagation_delay,
            zones,
            providers,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    fn account_file(&self) -> PathBuf {
        self.cert_dir.join(ACME_ACCOUNT_FILE)
    }

    async fn load_stored_credentials(
        &self,
    ) -> Result<HashMap<String, serde_json::Value>, CaError> {
        let path = self.account_file();
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| CaError::Storage {
                path: path.display().to_string(),
                reason: format!("invalid account file: {e}"),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(CaError::Storage {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn store_credentials(
        &self,
        email: &str,
        credentials: &AccountCredentials,
    ) -> Result<(), CaError> {
        let path = self.account_file();
        let storage_error = |reason: String| CaError::Storage {
            path: path.display().to_string(),
            reason,
        };

        let mut stored = self.load_stored_credentials().await?;
        let value = serde_json::to_value(credentials).map_err(|e| storage_error(e.to_string()))?;
        stored.insert(email.to_string(), value);
        let json =
            serde_json::to_string_pretty(&stored).map_err(|e| storage_error(e.to_string()))?;
        let target = path.clone();
        let written =
            tokio::task::spawn_blocking(move || atomic_write(&target, json.as_bytes(), true))
                .await
                .map_err(|e| storage_error(format!("write task failed: {e}")))?;
        written.map_err(|e| storage_error(e.to_string()))
    }

    /// Account for `email`, loaded from disk or created on first use.
    async fn account(&self, email: &str) -> Result<Account, CaError> {
        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.get(email) {
            return Ok(account.clone());
        }

        let account = if let Some(value) = self.load_stored_credentials().await?.remove(email) {
            info!(email = %email, "Loading existing ACME account");
            let credentials: AccountCredentials = serde_json::from_value(value)
                .map_err(|e| CaError::Account(format!("invalid stored credentials: {e}")))?;
            Account::builder()
                .map_err(|e| CaError::Account(e.to_string()))?
                .from_credentials(credentials)
                .await
                .map_err(|e| CaError::Account(e.to_string()))?
        } else {
            info!(email = %email, directory = %self.directory_url, "Creating ACME account");
            let contact = format!("mailto:{email}");
            let (account, credentials) = Account::builder()
                .map_err(|e| CaError::Account(e.to_string()))?
                .create(
                    &NewAccount {
                        contact: &[&contact],
                        terms_of_service_agreed: true,
                        only_return_existing: false,
                    },
                    self.directory_url.clone(),
                    None,
                )
                .await
                .map_err(|e| CaError::Account(e.to_string()))?;
            self.store_credentials(email, &credentials).await?;
            account
        };

        accounts.insert(email.to_string(), account.clone());
        Ok(account)
    }

    /// Provider client and zone id hosting `domain`.
    async fn challenge_target(
        &self,
        domain: &str,
    ) -> Result<(Arc<dyn ProviderClient>, String), CaError> {
        let challenge_error = |reason: String| CaError::Challenge {
            domain: domain.to_string(),
            reason,
        };

        let zone = self
            .zones
            .get_zone_info(domain)
            .await
            .map_err(|e| challenge_error(e.to_string()))?;
        let client = self.providers.get(&zone.provider).ok_or_else(|| {
            challenge_error(format!(
                "no credentials configured for provider '{}' (zone {})",
                zone.provider, zone.zone
            ))
        })?;
        let zone_id = client
            .get_zone_id(&zone.zone)
            .await
            .map_err(|e| challenge_error(e.to_string()))?;
        Ok((client, zone_id))
    }

    /// Publish DNS-01 records and mark every pending challenge ready.
    async fn complete_challenges(&self, domain: &str, order: &mut Order) -> Result<(), CaError> {
        let challenge_error = |reason: String| CaError::Challenge {
            domain: domain.to_string(),
            reason,
        };
        let (client, zone_id) = self.challenge_target(domain).await?;

        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| classify(domain, e, challenge_error))?;

            let name = match &authz.identifier().identifier {
                Identifier::Dns(name) => name.clone(),
                _ => continue,
            };
            if authz.status == AuthorizationStatus::Valid {
                debug!(domain = %name, "Authorization already valid");
                continue;
            }

            let mut challenge = authz
                .challenge(ChallengeType::Dns01)
                .ok_or_else(|| challenge_error("CA offered no DNS-01 challenge".to_string()))?;
            let value = dns01_challenge_value(challenge.key_authorization().as_str());
            let record_name = acme_challenge_record_name(&name);

            client
                .ensure_txt(&zone_id, &record_name, &value)
                .await
                .map_err(|e| challenge_error(e.to_string()))?;
            info!(domain = %name, record = %record_name, "Published DNS-01 challenge record");

            tokio::time::sleep(self.propagation_delay).await;
            challenge
                .set_ready()
                .await
                .map_err(|e| classify(domain, e, challenge_error))?;
        }
        Ok(())
    }

    async fn wait_for_status(
        domain: &str,
        order: &mut Order,
        target: OrderStatus,
        on_error: impl Fn(String) -> CaError + Copy,
    ) -> Result<(), CaError> {
        loop {
            let state = order
                .refresh()
                .await
                .map_err(|e| classify(domain, e, on_error))?;
            match &state.status {
                status if *status == target => return Ok(()),
                OrderStatus::Invalid => {
                    return Err(on_error("order became invalid".to_string()));
                }
                OrderStatus::Valid if target == OrderStatus::Ready => return Ok(()),
                status => {
                    debug!(domain = %domain, status = ?status, "Order not ready yet, waiting");
                    tokio::time::sleep(ORDER_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn finalize(domain: &str, order: &mut Order) -> Result<(String, String), CaError> {
        let finalize_error = |reason: String| CaError::Finalization {
            domain: domain.to_string(),
            reason,
        };

        let key = rcgen::KeyPair::generate()
            .map_err(|e| finalize_error(format!("failed to generate key: {e}")))?;
        let params = rcgen::CertificateParams::new(vec![domain.to_string()])
            .map_err(|e| finalize_error(format!("failed to create CSR params: {e}")))?;
        let csr = params
            .serialize_request(&key)
            .map_err(|e| finalize_error(format!("failed to serialize CSR: {e}")))?
            .der()
            .to_vec();

        order
            .finalize_csr(&csr)
            .await
            .map_err(|e| classify(domain, e, finalize_error))?;
        Self::wait_for_status(domain, order, OrderStatus::Valid, finalize_error).await?;

        let chain = order
            .certificate()
            .await
            .map_err(|e| classify(domain, e, finalize_error))?
            .ok_or_else(|| finalize_error("no certificate in response".to_string()))?;

        Ok((chain, key.serialize_pem()))
    }
}

/// Map an ACME error, recognising rate limiting.
fn classify(
    domain: &str,
    error: instant_acme::Error,
    fallback: impl Fn(String) -> CaError,
) -> CaError {
    let message = error.to_string();
    if message.contains("rateLimited") {
        CaError::RateLimited {
            domain: domain.to_string(),
        }
    } else {
        fallback(message)
    }
}

#[async_trait]
impl CertificateAuthority for AcmeAuthority {
    async fn issue_certificate(
        &self,
        domain: &str,
        email: &str,
    ) -> Result<IssuedCertificate, CaError> {
        let order_error = |reason: String| CaError::Order {
            domain: domain.to_string(),
            reason,
        };

        let account = self.account(email).await?;
        info!(domain = %domain, "Creating ACME order");
        let identifiers = [Identifier::Dns(domain.to_string())];
        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| classify(domain, e, order_error))?;

        self.complete_challenges(domain, &mut order).await?;
        Self::wait_for_status(domain, &mut order, OrderStatus::Ready, order_error).await?;
        let (chain, key) = Self::finalize(domain, &mut order).await?;

        let expires_at = parse_certificate_expiry(&chain)?;
        let paths = CertificatePaths::for_domain(&self.cert_dir, domain);
        let target = paths.clone();
        tokio::task::spawn_blocking(move || target.write(&chain, &key))
            .await
            .map_err(|e| CaError::Storage {
                path: paths.chain.display().to_string(),
                reason: format!("write task failed: {e}"),
            })??;

        info!(domain = %domain, expires_at = %expires_at, "Certificate issued");
        Ok(IssuedCertificate {
            expires_at,
            chain_path: paths.chain,
            key_path: paths.key,
        })
    }
}
