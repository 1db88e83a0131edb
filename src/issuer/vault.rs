//! Vault issuer (C5): HashiCorp Vault PKI is an external collaborator
//! (spec §1 Non-goals), so this backend is typed and wired into the
//! registry but stops short of a real client, the same way the teacher
//! scopes out unimplemented DNS providers behind `src/dns/providers/*`
//! feature-gated stubs. `Setup` only validates that the token secret is
//! present and non-empty; `issue`/`renew` return a `Configuration` error
//! until a real backend is wired.
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{AcmeError, Result};
use crate::resource::{Certificate, Issuer, IssuerSpec, VaultIssuerSpec};
use crate::store::SecretStore;

use super::{CertificateIssuer, IssuerDeps, KeyCertPair, SetupOutcome};

pub struct VaultIssuer {
    spec: VaultIssuerSpec,
    token_secret_key: String,
    secrets: Arc<dyn SecretStore>,
}

impl VaultIssuer {
    pub fn from_resource(issuer: &Issuer, deps: IssuerDeps) -> Result<Arc<dyn CertificateIssuer>> {
        let spec = match &issuer.spec {
            IssuerSpec::Vault(spec) => spec.clone(),
            other => {
                return Err(AcmeError::configuration(format!(
                    "expected a vault issuer spec, got {other:?}"
                )));
            }
        };
        let token_secret_key = match &issuer.metadata.namespace {
            Some(ns) => format!("{ns}/{}", spec.token_secret_name),
            None => spec.token_secret_name.clone(),
        };
        Ok(Arc::new(VaultIssuer {
            spec,
            token_secret_key,
            secrets: deps.secrets,
        }))
    }
}

#[async_trait]
impl CertificateIssuer for VaultIssuer {
    async fn setup(&self) -> Result<SetupOutcome> {
        let secret = self
            .secrets
            .get(&self.token_secret_key)
            .await?
            .ok_or_else(|| {
                AcmeError::configuration(format!(
                    "vault token secret {} not found",
                    self.token_secret_key
                ))
            })?;
        if secret.tls_key.is_empty() {
            return Err(AcmeError::configuration("vault token secret is empty"));
        }
        Ok(SetupOutcome::default())
    }

    async fn prepare(&self, _crt: &Certificate) -> Result<()> {
        Ok(())
    }

    async fn issue(&self, _crt: &Certificate) -> Result<KeyCertPair> {
        Err(AcmeError::configuration(format!(
            "vault issuer {} at {} has no backend wired in this crate",
            self.spec.path, self.spec.server
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::resource::{IssuerStatus, ObjectMeta, Secret};
    use crate::store::FakeSecretStore;

    fn vault_issuer(name: &str) -> Issuer {
        Issuer {
            metadata: ObjectMeta::namespaced(name, "default"),
            spec: IssuerSpec::Vault(VaultIssuerSpec {
                server: "https://vault.example:8200".to_string(),
                path: "pki/sign/web".to_string(),
                token_secret_name: "vault-token".to_string(),
            }),
            status: IssuerStatus::default(),
        }
    }

    fn deps() -> IssuerDeps {
        IssuerDeps {
            secrets: Arc::new(FakeSecretStore::new()),
            orders: Arc::new(crate::store::FakeResourceStore::new()),
            clock: Arc::new(FakeClock::default()),
            http_client: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn setup_fails_without_token_secret() {
        let issuer = VaultIssuer::from_resource(&vault_issuer("vault"), deps()).unwrap();
        assert!(issuer.setup().await.is_err());
    }

    #[tokio::test]
    async fn setup_succeeds_once_token_secret_exists() {
        let deps = deps();
        deps.secrets
            .create(Secret {
                metadata: ObjectMeta::namespaced("vault-token", "default"),
                tls_crt: vec![],
                tls_key: b"s.abc123".to_vec(),
                ca_crt: None,
                annotations: Default::default(),
                labels: Default::default(),
            })
            .await
            .unwrap();
        let issuer = VaultIssuer::from_resource(&vault_issuer("vault"), deps).unwrap();
        assert!(issuer.setup().await.is_ok());
    }

    #[tokio::test]
    async fn issue_reports_no_backend_wired() {
        let deps = deps();
        deps.secrets
            .create(Secret {
                metadata: ObjectMeta::namespaced("vault-token", "default"),
                tls_crt: vec![],
                tls_key: b"s.abc123".to_vec(),
                ca_crt: None,
                annotations: Default::default(),
                labels: Default::default(),
            })
            .await
            .unwrap();
        let issuer = VaultIssuer::from_resource(&vault_issuer("vault"), deps).unwrap();
        let cert = Certificate {
            metadata: ObjectMeta::namespaced("web", "default"),
            spec: crate::resource::CertificateSpec {
                secret_name: "web-tls".to_string(),
                issuer_ref: crate::resource::IssuerRef {
                    name: "vault".to_string(),
                    kind: None,
                },
                common_name: None,
                dns_names: vec!["web.example.com".to_string()],
                ip_addresses: vec![],
                uri_sans: vec![],
                duration_seconds: None,
                renew_before_seconds: None,
                key: crate::resource::KeySpec::default(),
                is_ca: false,
                usages: vec![],
            },
            status: crate::resource::CertificateStatus::default(),
        };
        let err = issuer.issue(&cert).await.unwrap_err();
        assert!(matches!(err, AcmeError::Configuration(_)));
    }
}
