//! CA-signed issuer (C5): signs leaf certificates with a CA keypair read
//! from a `Secret`, mirroring the teacher's `certgen::sign_with_ca` path
//! plus the `SecretStore` seam already used by the webhook bootstrap
//! controller for its own CA material.
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{AcmeError, Result};
use crate::resource::{Certificate, Issuer, IssuerSpec};
use crate::store::SecretStore;

use super::certgen::{build_params, generate_key_pair, sign_with_ca};
use super::{CertificateIssuer, IssuerDeps, KeyCertPair, SetupOutcome};

pub struct CaIssuer {
    secret_key: String,
    secrets: Arc<dyn SecretStore>,
}

impl CaIssuer {
    pub fn from_resource(issuer: &Issuer, deps: IssuerDeps) -> Result<Arc<dyn CertificateIssuer>> {
        let spec = match &issuer.spec {
            IssuerSpec::Ca(spec) => spec,
            other => {
                return Err(AcmeError::configuration(format!(
                    "expected a ca issuer spec, got {other:?}"
                )));
            }
        };
        let secret_key = match &issuer.metadata.namespace {
            Some(ns) => format!("{ns}/{}", spec.secret_name),
            None => spec.secret_name.clone(),
        };
        Ok(Arc::new(CaIssuer {
            secret_key,
            secrets: deps.secrets,
        }))
    }

    async fn load_ca(&self) -> Result<(String, String)> {
        let secret = self
            .secrets
            .get(&self.secret_key)
            .await?
            .ok_or_else(|| AcmeError::configuration(format!("CA secret {} not found", self.secret_key)))?;
        let cert_pem = String::from_utf8(secret.tls_crt)
            .map_err(|e| AcmeError::pem(format!("CA secret tls.crt is not valid utf8: {e}")))?;
        let key_pem = String::from_utf8(secret.tls_key)
            .map_err(|e| AcmeError::pem(format!("CA secret tls.key is not valid utf8: {e}")))?;
        Ok((cert_pem, key_pem))
    }
}

fn sans(crt: &Certificate) -> Vec<String> {
    let mut sans = crt.spec.dns_names.clone();
    sans.extend(crt.spec.ip_addresses.clone());
    sans
}

#[async_trait]
impl CertificateIssuer for CaIssuer {
    async fn setup(&self) -> Result<SetupOutcome> {
        // Fail fast if the CA secret is missing or malformed rather than
        // waiting for the first certificate to discover it.
        self.load_ca().await?;
        Ok(SetupOutcome::default())
    }

    async fn prepare(&self, _crt: &Certificate) -> Result<()> {
        Ok(())
    }

    async fn issue(&self, crt: &Certificate) -> Result<KeyCertPair> {
        let (ca_cert_pem, ca_key_pem) = self.load_ca().await?;
        let leaf_key = generate_key_pair(&crt.spec.key)?;
        let duration = std::time::Duration::from_secs(crt.spec.duration_seconds() as u64);
        let params = build_params(
            crt.spec.common_name.as_deref(),
            &sans(crt),
            &crt.spec.uri_sans,
            crt.spec.is_ca,
            duration,
        )?;
        let generated = sign_with_ca(params, &leaf_key, &ca_cert_pem, &ca_key_pem)?;
        Ok((generated.key_pem, generated.cert_pem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::issuer::certgen::{build_params as bp, generate_key_pair as gkp, self_sign};
    use crate::resource::{
        CaIssuerSpec, CertificateSpec, CertificateStatus, IssuerRef, IssuerStatus, KeyAlgorithm,
        KeySpec, ObjectMeta, Secret,
    };
    use crate::store::FakeSecretStore;

    fn ca_secret() -> Secret {
        let key = gkp(&KeySpec {
            algorithm: KeyAlgorithm::Ecdsa,
            size: Some(256),
            encoding: None,
        })
        .unwrap();
        let params = bp(
            Some("test-ca"),
            &[],
            &[],
            true,
            std::time::Duration::from_secs(365 * 24 * 3600),
        )
        .unwrap();
        let generated = self_sign(params, &key).unwrap();
        Secret {
            metadata: ObjectMeta::namespaced("ca-keypair", "default"),
            tls_crt: generated.cert_pem,
            tls_key: generated.key_pem,
            ca_crt: None,
            annotations: Default::default(),
            labels: Default::default(),
        }
    }

    fn ca_issuer(name: &str) -> Issuer {
        Issuer {
            metadata: ObjectMeta::namespaced(name, "default"),
            spec: IssuerSpec::Ca(CaIssuerSpec {
                secret_name: "ca-keypair".to_string(),
            }),
            status: IssuerStatus::default(),
        }
    }

    fn sample_cert() -> Certificate {
        Certificate {
            metadata: ObjectMeta::namespaced("web", "default"),
            spec: CertificateSpec {
                secret_name: "web-tls".to_string(),
                issuer_ref: IssuerRef {
                    name: "ca-issuer".to_string(),
                    kind: None,
                },
                common_name: Some("web.example.com".to_string()),
                dns_names: vec!["web.example.com".to_string()],
                ip_addresses: vec![],
                uri_sans: vec![],
                duration_seconds: None,
                renew_before_seconds: None,
                key: KeySpec::default(),
                is_ca: false,
                usages: vec![],
            },
            status: CertificateStatus::default(),
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
    async fn issues_a_leaf_signed_by_the_ca_secret() {
        let deps = deps();
        deps.secrets.create(ca_secret()).await.unwrap();
        let issuer = CaIssuer::from_resource(&ca_issuer("prod-ca"), deps).unwrap();
        let (key, cert) = issuer.issue(&sample_cert()).await.unwrap();
        assert!(!key.is_empty());
        assert!(String::from_utf8(cert).unwrap().contains("BEGIN CERTIFICATE"));
    }

    #[tokio::test]
    async fn setup_fails_when_ca_secret_is_missing() {
        let issuer = CaIssuer::from_resource(&ca_issuer("prod-ca"), deps()).unwrap();
        assert!(issuer.setup().await.is_err());
    }
}
