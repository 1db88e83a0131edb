//! Self-signed issuer (C5): every certificate signs itself, no external
//! state and no `IssuerDeps` fields used. Grounded on the teacher's
//! `certgen` helpers (`issuer/certgen.rs`), which already factor key
//! generation and self-signing out of the per-kind issuer logic.
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::resource::{Certificate, Issuer, IssuerSpec};

use super::certgen::{build_params, generate_key_pair, self_sign};
use super::{CertificateIssuer, KeyCertPair, SetupOutcome};

pub struct SelfSignedIssuer;

impl SelfSignedIssuer {
    pub fn from_resource(issuer: &Issuer) -> Result<Arc<dyn CertificateIssuer>> {
        match &issuer.spec {
            IssuerSpec::SelfSigned(_) => Ok(Arc::new(SelfSignedIssuer)),
            other => Err(crate::error::AcmeError::configuration(format!(
                "expected a selfSigned issuer spec, got {other:?}"
            ))),
        }
    }

    fn generate(&self, crt: &Certificate) -> Result<KeyCertPair> {
        let key = generate_key_pair(&crt.spec.key)?;
        let duration = std::time::Duration::from_secs(crt.spec.duration_seconds() as u64);
        let params = build_params(
            crt.spec.common_name.as_deref(),
            &sans(crt),
            &crt.spec.uri_sans,
            crt.spec.is_ca,
            duration,
        )?;
        let generated = self_sign(params, &key)?;
        Ok((generated.key_pem, generated.cert_pem))
    }
}

fn sans(crt: &Certificate) -> Vec<String> {
    let mut sans = crt.spec.dns_names.clone();
    sans.extend(crt.spec.ip_addresses.clone());
    sans
}

#[async_trait]
impl CertificateIssuer for SelfSignedIssuer {
    async fn setup(&self) -> Result<SetupOutcome> {
        Ok(SetupOutcome::default())
    }

    async fn prepare(&self, _crt: &Certificate) -> Result<()> {
        Ok(())
    }

    async fn issue(&self, crt: &Certificate) -> Result<KeyCertPair> {
        self.generate(crt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{CertificateSpec, CertificateStatus, IssuerRef, KeySpec, ObjectMeta};

    fn sample_cert() -> Certificate {
        Certificate {
            metadata: ObjectMeta::namespaced("web", "default"),
            spec: CertificateSpec {
                secret_name: "web-tls".to_string(),
                issuer_ref: IssuerRef {
                    name: "selfsigned".to_string(),
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

    #[tokio::test]
    async fn issues_a_self_signed_certificate() {
        let issuer = SelfSignedIssuer;
        let (key, cert) = issuer.issue(&sample_cert()).await.unwrap();
        assert!(!key.is_empty());
        assert!(String::from_utf8(cert).unwrap().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn rejects_non_selfsigned_spec() {
        let mut issuer = sample_cert();
        issuer.metadata = ObjectMeta::namespaced("acme-issuer", "default");
        let wrong = Issuer {
            metadata: ObjectMeta::namespaced("prod", "default"),
            spec: IssuerSpec::Acme(crate::resource::AcmeIssuerSpec {
                server: "https://acme.example/directory".to_string(),
                email: None,
                private_key_secret_name: "acme-key".to_string(),
            }),
            status: Default::default(),
        };
        assert!(SelfSignedIssuer::from_resource(&wrong).is_err());
    }
}
