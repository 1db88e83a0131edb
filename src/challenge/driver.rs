//! CRD-level challenge drivers (C7): present/check/cleanup for a
//! `resource::Challenge`, generalized from the teacher's wire-protocol
//! `ChallengeSolver` trait (`challenge/mod.rs`) which operates on
//! `order::Challenge` (an ACME response body) rather than a standalone
//! resource the controller can reconcile independently.
//!
//! `Http01Driver` reuses the teacher's `Http01Solver` approach of serving
//! the key authorization straight out of the controller process; unlike
//! the solver it keeps one long-lived axum server and a shared token map
//! instead of spinning a server up per challenge. `Dns01Driver` reuses
//! `DnsProvider` for presenting the TXT record and `CachingDnsResolver`
//! for the authoritative self-check before telling the ACME server the
//! challenge is ready.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use super::dns01::DnsProvider;
use super::dns_cache::CachingDnsResolver;
use crate::error::{AcmeError, Result};
use crate::resource::ChallengeSpec;
use crate::types::ChallengeType;

/// Drives one challenge type end to end against a `resource::ChallengeSpec`.
/// `present` sets up whatever external state the validation method needs,
/// `self_check` confirms it is visible before telling the ACME server to
/// validate (saves a wasted ACME round trip on unpropagated DNS/slow
/// ingress), and `cleanup` tears the state back down once the challenge
/// reaches a terminal state.
#[async_trait]
pub trait ChallengeDriver: Send + Sync {
    fn challenge_type(&self) -> ChallengeType;
    async fn present(&self, challenge: &ChallengeSpec) -> Result<()>;
    async fn self_check(&self, challenge: &ChallengeSpec) -> Result<bool>;
    async fn cleanup(&self, challenge: &ChallengeSpec) -> Result<()>;
}

/// Registry of drivers keyed by challenge type, the CRD-level analogue of
/// the teacher's `ChallengeSolverRegistry`.
#[derive(Default)]
pub struct ChallengeDriverRegistry {
    drivers: HashMap<ChallengeType, Arc<dyn ChallengeDriver>>,
}

impl ChallengeDriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn ChallengeDriver>) {
        self.drivers.insert(driver.challenge_type(), driver);
    }

    pub fn get(&self, kind: ChallengeType) -> Option<Arc<dyn ChallengeDriver>> {
        self.drivers.get(&kind).cloned()
    }
}

/// Serves `/.well-known/acme-challenge/:token` out of an in-memory map of
/// token to key authorization. One server is bound at construction time and
/// shared across every HTTP-01 challenge the controller presents, rather
/// than binding a fresh listener per challenge as `Http01Solver` does.
pub struct Http01Driver {
    tokens: Arc<RwLock<HashMap<String, String>>>,
    _server: tokio::task::JoinHandle<()>,
}

impl Http01Driver {
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self> {
        let tokens: Arc<RwLock<HashMap<String, String>>> = Arc::new(RwLock::new(HashMap::new()));
        let app = Router::new()
            .route("/.well-known/acme-challenge/:token", get(handle_challenge))
            .with_state(tokens.clone());

        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| AcmeError::transport(format!("failed to bind HTTP-01 listener: {e}")))?;

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            tokens,
            _server: server,
        })
    }
}

async fn handle_challenge(
    Path(token): Path<String>,
    State(tokens): State<Arc<RwLock<HashMap<String, String>>>>,
) -> std::result::Result<String, StatusCode> {
    tokens
        .read()
        .await
        .get(&token)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

#[async_trait]
impl ChallengeDriver for Http01Driver {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Http01
    }

    async fn present(&self, challenge: &ChallengeSpec) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(challenge.token.clone(), challenge.key_authorization.clone());
        Ok(())
    }

    async fn self_check(&self, challenge: &ChallengeSpec) -> Result<bool> {
        let url = format!(
            "http://{}/.well-known/acme-challenge/{}",
            challenge.dns_name, challenge.token
        );
        match reqwest::get(&url).await {
            Ok(resp) if resp.status().is_success() => {
                let body = resp.text().await.unwrap_or_default();
                Ok(body.trim() == challenge.key_authorization)
            }
            _ => Ok(false),
        }
    }

    async fn cleanup(&self, challenge: &ChallengeSpec) -> Result<()> {
        self.tokens.write().await.remove(&challenge.token);
        Ok(())
    }
}

/// Presents a DNS-01 TXT record through a `DnsProvider` and confirms
/// propagation via an authoritative lookup before reporting readiness.
/// Keeps the record id `create_txt_record` returns, keyed by record name,
/// so `cleanup` can thread it back into `delete_txt_record` the way the
/// teacher's `Dns01Solver` threads it from `prepare` to `cleanup`.
pub struct Dns01Driver {
    provider: Arc<dyn DnsProvider>,
    resolver: Option<Arc<CachingDnsResolver>>,
    record_ids: RwLock<HashMap<String, String>>,
}

impl Dns01Driver {
    pub fn new(provider: Arc<dyn DnsProvider>, resolver: Option<Arc<CachingDnsResolver>>) -> Self {
        Self {
            provider,
            resolver,
            record_ids: RwLock::new(HashMap::new()),
        }
    }

    fn record_name(challenge: &ChallengeSpec) -> String {
        format!("_acme-challenge.{}", challenge.dns_name.trim_start_matches("*."))
    }

    fn record_value(key_authorization: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key_authorization.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

#[async_trait]
impl ChallengeDriver for Dns01Driver {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Dns01
    }

    async fn present(&self, challenge: &ChallengeSpec) -> Result<()> {
        let name = Self::record_name(challenge);
        let value = Self::record_value(&challenge.key_authorization);
        let id = self.provider.create_txt_record(&name, &value).await?;
        self.record_ids.write().await.insert(name, id);
        Ok(())
    }

    async fn self_check(&self, challenge: &ChallengeSpec) -> Result<bool> {
        let name = Self::record_name(challenge);
        let value = Self::record_value(&challenge.key_authorization);
        match &self.resolver {
            Some(resolver) => {
                let txts = resolver.resolve_txt(&name).await.unwrap_or_default();
                Ok(txts.iter().any(|t| t.trim_matches('"') == value))
            }
            None => self.provider.verify_record(&name, &value).await,
        }
    }

    async fn cleanup(&self, challenge: &ChallengeSpec) -> Result<()> {
        let name = Self::record_name(challenge);
        // Idempotent: a challenge that was never presented, or whose
        // cleanup already ran, finds nothing to remove and no-ops.
        if let Some(id) = self.record_ids.write().await.remove(&name) {
            self.provider.delete_txt_record(&name, &id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::dns01::MockDnsProvider;
    use crate::types::ChallengeType;

    fn sample_challenge() -> ChallengeSpec {
        ChallengeSpec {
            dns_name: "example.com".to_string(),
            kind: ChallengeType::Dns01,
            token: "tok123".to_string(),
            key_authorization: "tok123.thumb".to_string(),
            url: "https://acme.example/chal/1".to_string(),
            authorization_url: "https://acme.example/authz/1".to_string(),
        }
    }

    #[tokio::test]
    async fn dns01_present_then_self_check_succeeds() {
        let driver = Dns01Driver::new(Arc::new(MockDnsProvider::new()), None);
        let challenge = sample_challenge();
        driver.present(&challenge).await.unwrap();
        assert!(driver.self_check(&challenge).await.unwrap());
    }

    #[tokio::test]
    async fn dns01_self_check_fails_before_present() {
        let driver = Dns01Driver::new(Arc::new(MockDnsProvider::new()), None);
        let challenge = sample_challenge();
        assert!(!driver.self_check(&challenge).await.unwrap());
    }

    #[tokio::test]
    async fn dns01_cleanup_deletes_the_record_it_created() {
        let driver = Dns01Driver::new(Arc::new(MockDnsProvider::new()), None);
        let challenge = sample_challenge();
        driver.present(&challenge).await.unwrap();
        assert!(driver.self_check(&challenge).await.unwrap());

        driver.cleanup(&challenge).await.unwrap();

        assert!(!driver.self_check(&challenge).await.unwrap());
    }

    #[tokio::test]
    async fn dns01_cleanup_is_idempotent() {
        let driver = Dns01Driver::new(Arc::new(MockDnsProvider::new()), None);
        let challenge = sample_challenge();
        driver.present(&challenge).await.unwrap();

        driver.cleanup(&challenge).await.unwrap();
        driver.cleanup(&challenge).await.unwrap();
    }

    #[test]
    fn registry_resolves_by_challenge_type() {
        let mut registry = ChallengeDriverRegistry::new();
        registry.register(Arc::new(Dns01Driver::new(Arc::new(MockDnsProvider::new()), None)));
        assert!(registry.get(ChallengeType::Dns01).is_some());
        assert!(registry.get(ChallengeType::Http01).is_none());
    }
}
