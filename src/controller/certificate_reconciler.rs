//! Certificate reconciler (C4): drives a `Certificate` toward a stored,
//! up-to-date TLS `Secret` through its resolved issuer (C5). Grounded on the
//! ten-step sync described for cert-manager's certificate controller, with
//! the standalone Issuer controller folded into this reconciler's lazy
//! per-issuer setup step since no dedicated issuer work queue is in scope
//! (see the Open Question resolution in DESIGN.md).
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;

use crate::certificate::CertificateChain;
use crate::clock::Clock;
use crate::controller::runtime::Sync as Syncer;
use crate::error::{AcmeError, Result};
use crate::issuer::certgen::public_key_der_from_private_pem;
use crate::issuer::IssuerFactory;
use crate::resource::{
    has_ready_true, Certificate, CertificateSpec, Condition, ConditionStatus, Issuer,
    IssuerRefKind, Secret, ANNOTATION_ALT_NAMES, ANNOTATION_COMMON_NAME, ANNOTATION_ISSUER_KIND,
    ANNOTATION_ISSUER_NAME,
};
use crate::scheduler::scheduled_queue::Scheduler;
use crate::store::{EventRecorder, EventType, ResourceStore, SecretStore};
use crate::validation::validate_certificate_spec;

/// Reconciles `Certificate` objects. Key format is `ObjectMeta::key()`
/// (`namespace/name`) since certificates are always namespaced.
pub struct CertificateReconciler {
    certificates: Arc<dyn ResourceStore<Certificate>>,
    issuers: Arc<dyn ResourceStore<Issuer>>,
    cluster_issuers: Arc<dyn ResourceStore<Issuer>>,
    secrets: Arc<dyn SecretStore>,
    issuer_factory: Arc<IssuerFactory>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventRecorder>,
    renewals: Arc<dyn Scheduler<String>>,
}

impl CertificateReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        certificates: Arc<dyn ResourceStore<Certificate>>,
        issuers: Arc<dyn ResourceStore<Issuer>>,
        cluster_issuers: Arc<dyn ResourceStore<Issuer>>,
        secrets: Arc<dyn SecretStore>,
        issuer_factory: Arc<IssuerFactory>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventRecorder>,
        renewals: Arc<dyn Scheduler<String>>,
    ) -> Self {
        Self {
            certificates,
            issuers,
            cluster_issuers,
            secrets,
            issuer_factory,
            clock,
            events,
            renewals,
        }
    }

    fn issuer_key(crt: &Certificate) -> String {
        match crt.spec.issuer_ref.kind_or_default() {
            IssuerRefKind::Issuer => match &crt.metadata.namespace {
                Some(ns) => format!("{ns}/{}", crt.spec.issuer_ref.name),
                None => crt.spec.issuer_ref.name.clone(),
            },
            IssuerRefKind::ClusterIssuer => crt.spec.issuer_ref.name.clone(),
        }
    }

    async fn resolve_issuer(&self, crt: &Certificate) -> Result<Issuer> {
        let key = Self::issuer_key(crt);
        let store = match crt.spec.issuer_ref.kind_or_default() {
            IssuerRefKind::Issuer => &self.issuers,
            IssuerRefKind::ClusterIssuer => &self.cluster_issuers,
        };
        store
            .get(&key)
            .await?
            .ok_or_else(|| AcmeError::not_found(format!("issuer {key} not found")))
    }

    /// Register the issuer's own preconditions (e.g. ACME account) the first
    /// time a certificate reconciles against it, persisting a Ready
    /// condition on `Issuer.status` so later certificates skip this step.
    async fn ensure_issuer_ready(
        &self,
        issuer: &Issuer,
        backend: &Arc<dyn crate::issuer::CertificateIssuer>,
    ) -> Result<()> {
        if has_ready_true(&issuer.status.conditions) {
            return Ok(());
        }

        let key = crate::store::Versioned::store_key(issuer);
        let store = if self.issuers.get(&key).await?.is_some() {
            &self.issuers
        } else {
            &self.cluster_issuers
        };

        let setup_result = backend.setup().await;
        let now = self.clock.now();

        let (status, reason, message) = match &setup_result {
            Ok(outcome) if outcome.requeue => (
                ConditionStatus::False,
                "FailedVerify".to_string(),
                "issuer setup still in progress".to_string(),
            ),
            Ok(_) => (ConditionStatus::True, "Verified".to_string(), "issuer setup succeeded".to_string()),
            Err(err) if !err.is_retriable() => {
                (ConditionStatus::False, "FailedConfig".to_string(), err.to_string())
            }
            Err(err) => (ConditionStatus::False, "FailedRegister".to_string(), err.to_string()),
        };

        let mut updated = issuer.clone();
        if let Ok(outcome) = &setup_result {
            if let Some(account_url) = &outcome.account_url {
                updated.status.acme_account_url = Some(account_url.clone());
            }
        }
        updated.status.conditions = vec![Condition::ready(status, &reason, &message, now)];
        store
            .update_status(&key, updated, issuer.metadata.resource_version)
            .await?;

        let event_type = if status == ConditionStatus::True {
            EventType::Normal
        } else {
            EventType::Warning
        };
        self.events.record(&key, event_type, &reason, &message);

        match setup_result {
            Ok(outcome) if outcome.requeue => Err(AcmeError::timeout("issuer setup still in progress")),
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn secret_key(crt: &Certificate) -> String {
        match &crt.metadata.namespace {
            Some(ns) => format!("{ns}/{}", crt.spec.secret_name),
            None => crt.spec.secret_name.clone(),
        }
    }

    /// Whether the stored secret (if any) still satisfies `spec`: present,
    /// matching common name/SANs, public key consistent with the stored
    /// private key, and outside the renewal window.
    fn needs_issue(spec: &CertificateSpec, secret: Option<&Secret>, now: Timestamp) -> Result<bool> {
        let Some(secret) = secret else {
            return Ok(true);
        };

        let chain = match CertificateChain::from_pem(&secret.tls_crt) {
            Ok(chain) => chain,
            Err(_) => return Ok(true),
        };

        if let Some(cn) = &spec.common_name {
            if chain.common_name().ok().as_deref() != Some(cn.as_str()) {
                return Ok(true);
            }
        }

        let mut wanted_sans = spec.dns_names.clone();
        wanted_sans.sort();
        let mut have_sans = chain.subject_alt_names().unwrap_or_default();
        have_sans.sort();
        if wanted_sans != have_sans {
            return Ok(true);
        }

        let key_pem = String::from_utf8_lossy(&secret.tls_key).into_owned();
        let stored_pubkey = match public_key_der_from_private_pem(&key_pem) {
            Ok(der) => der,
            Err(_) => return Ok(true),
        };
        let cert_pubkey = chain.subject_public_key_info().unwrap_or_default();
        if stored_pubkey != cert_pubkey {
            return Ok(true);
        }

        let not_after = chain.not_after()?;
        let renew_at = not_after.as_second() - spec.renew_before_seconds();
        if now.as_second() >= renew_at {
            return Ok(true);
        }

        Ok(false)
    }

    fn secret_annotations(crt: &Certificate) -> std::collections::BTreeMap<String, String> {
        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert(
            ANNOTATION_ISSUER_NAME.to_string(),
            crt.spec.issuer_ref.name.clone(),
        );
        annotations.insert(
            ANNOTATION_ISSUER_KIND.to_string(),
            match crt.spec.issuer_ref.kind_or_default() {
                IssuerRefKind::Issuer => "Issuer".to_string(),
                IssuerRefKind::ClusterIssuer => "ClusterIssuer".to_string(),
            },
        );
        if let Some(cn) = &crt.spec.common_name {
            annotations.insert(ANNOTATION_COMMON_NAME.to_string(), cn.clone());
        }
        if !crt.spec.dns_names.is_empty() {
            annotations.insert(ANNOTATION_ALT_NAMES.to_string(), crt.spec.dns_names.join(","));
        }
        annotations
    }

    fn secret_labels(crt: &Certificate, existing: Option<&Secret>) -> std::collections::BTreeMap<String, String> {
        let mut labels = existing.map(|e| e.labels.clone()).unwrap_or_default();
        labels.insert(
            crate::resource::LABEL_CERTIFICATE_NAME.to_string(),
            crt.metadata.name.clone(),
        );
        labels
    }

    async fn upsert_secret(&self, crt: &Certificate, key_pem: Vec<u8>, cert_pem: Vec<u8>) -> Result<()> {
        let key = Self::secret_key(crt);
        let existing = self.secrets.get(&key).await?;
        let secret = Secret {
            metadata: match &existing {
                Some(e) => e.metadata.clone(),
                None => crate::resource::ObjectMeta::namespaced(
                    crt.spec.secret_name.clone(),
                    crt.metadata.namespace.clone().unwrap_or_default(),
                ),
            },
            tls_crt: cert_pem,
            tls_key: key_pem,
            ca_crt: None,
            annotations: Self::secret_annotations(crt),
            labels: Self::secret_labels(crt, existing.as_ref()),
        };
        match existing {
            Some(e) => {
                self.secrets.update(&key, secret, e.metadata.resource_version).await?;
            }
            None => {
                self.secrets.create(secret).await?;
            }
        }
        Ok(())
    }

    async fn set_ready(
        &self,
        crt: &Certificate,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        let key = crt.metadata.key();
        let current = self
            .certificates
            .get(&key)
            .await?
            .ok_or_else(|| AcmeError::not_found(key.clone()))?;
        let mut updated = current.clone();
        let now = self.clock.now();
        let changed = match updated.status.conditions.iter_mut().find(|c| c.kind == "Ready") {
            Some(existing) => existing.set(status, reason, message, now),
            None => {
                updated
                    .status
                    .conditions
                    .push(Condition::ready(status, reason, message, now));
                true
            }
        };
        if changed {
            self.certificates
                .update_status(&key, updated, current.metadata.resource_version)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Syncer for CertificateReconciler {
    async fn sync(&self, key: &str) -> Result<()> {
        let Some(crt) = self.certificates.get(key).await? else {
            return Ok(());
        };

        let validation = validate_certificate_spec(&crt.spec);
        if !validation.is_valid() {
            self.set_ready(&crt, ConditionStatus::False, "ConfigError", &validation.to_string())
                .await?;
            self.events
                .record(key, EventType::Warning, "ConfigError", &validation.to_string());
            return Ok(());
        }

        let issuer = match self.resolve_issuer(&crt).await {
            Ok(issuer) => issuer,
            Err(err) => {
                self.set_ready(&crt, ConditionStatus::False, "IssuerNotFound", &err.to_string())
                    .await?;
                self.events
                    .record(key, EventType::Warning, "IssuerNotFound", &err.to_string());
                return Err(err);
            }
        };

        let backend = self.issuer_factory.get_or_build(&issuer)?;
        if let Err(err) = self.ensure_issuer_ready(&issuer, &backend).await {
            self.set_ready(&crt, ConditionStatus::False, "IssuerNotReady", &err.to_string())
                .await?;
            self.events
                .record(key, EventType::Warning, "IssuerNotReady", &err.to_string());
            return Err(err);
        }

        let secret_key = Self::secret_key(&crt);
        let existing_secret = self.secrets.get(&secret_key).await?;
        let now = self.clock.now();
        if !Self::needs_issue(&crt.spec, existing_secret.as_ref(), now)? {
            self.set_ready(&crt, ConditionStatus::True, "Ready", "certificate is up to date")
                .await?;
            if let Some(secret) = &existing_secret {
                if let Ok(chain) = CertificateChain::from_pem(&secret.tls_crt) {
                    if let Ok(not_after) = chain.not_after() {
                        let renew_in = (not_after.as_second() - crt.spec.renew_before_seconds()
                            - now.as_second())
                        .max(0) as u64;
                        self.renewals.schedule(key.to_string(), Duration::from_secs(renew_in));
                    }
                }
            }
            return Ok(());
        }

        if let Err(err) = backend.prepare(&crt).await {
            let reason = if err.is_retriable() { "IssuingInProgress" } else { "IssuingFailed" };
            self.set_ready(&crt, ConditionStatus::False, reason, &err.to_string())
                .await?;
            self.events.record(key, EventType::Warning, reason, &err.to_string());
            return Err(err);
        }

        let (key_pem, cert_pem) = backend.issue(&crt).await?;
        self.upsert_secret(&crt, key_pem, cert_pem.clone()).await?;

        let chain = CertificateChain::from_pem(&cert_pem)?;
        let not_after = chain.not_after()?;

        let current = self
            .certificates
            .get(key)
            .await?
            .ok_or_else(|| AcmeError::not_found(key.to_string()))?;
        let mut updated = current.clone();
        updated.status.not_after = Some(not_after);
        updated.status.order_ref = None;
        updated.status.conditions = vec![Condition::ready(
            ConditionStatus::True,
            "Issued",
            "certificate issued",
            now,
        )];
        self.certificates
            .update_status(key, updated, current.metadata.resource_version)
            .await?;
        self.events.record(key, EventType::Normal, "Issued", "certificate issued");

        let renew_in = (not_after.as_second() - crt.spec.renew_before_seconds() - now.as_second())
            .max(0) as u64;
        self.renewals.schedule(key.to_string(), Duration::from_secs(renew_in));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::issuer::{IssuerDeps, IssuerRegistry};
    use crate::resource::{
        CertificateSpec, CertificateStatus, IssuerRef, IssuerSpec, IssuerStatus, KeySpec, ObjectMeta,
        Order, SelfSignedIssuerSpec,
    };
    use crate::store::{FakeEventRecorder, FakeResourceStore, FakeSecretStore};

    fn selfsigned_issuer() -> Issuer {
        Issuer {
            metadata: ObjectMeta::namespaced("selfsigned", "default"),
            spec: IssuerSpec::SelfSigned(SelfSignedIssuerSpec::default()),
            status: IssuerStatus::default(),
        }
    }

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

    struct NullScheduler;
    impl Scheduler<String> for NullScheduler {
        fn schedule(&self, _key: String, _after: Duration) {}
        fn cancel(&self, _key: &String) {}
    }

    async fn new_reconciler() -> (CertificateReconciler, Arc<dyn ResourceStore<Certificate>>) {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
        let certificates: Arc<dyn ResourceStore<Certificate>> = Arc::new(FakeResourceStore::new());
        let issuers: Arc<dyn ResourceStore<Issuer>> = Arc::new(FakeResourceStore::new());
        let cluster_issuers: Arc<dyn ResourceStore<Issuer>> = Arc::new(FakeResourceStore::new());
        let secrets: Arc<dyn SecretStore> = Arc::new(FakeSecretStore::new());
        let orders: Arc<dyn ResourceStore<Order>> = Arc::new(FakeResourceStore::new());

        issuers.create(selfsigned_issuer()).await.unwrap();

        let deps = IssuerDeps {
            secrets: secrets.clone(),
            orders,
            clock: clock.clone(),
            http_client: reqwest::Client::new(),
        };
        let issuer_factory = Arc::new(IssuerFactory::new(IssuerRegistry::with_defaults(), deps));

        let reconciler = CertificateReconciler::new(
            certificates.clone(),
            issuers,
            cluster_issuers,
            secrets,
            issuer_factory,
            clock,
            Arc::new(FakeEventRecorder::new()),
            Arc::new(NullScheduler),
        );
        (reconciler, certificates)
    }

    #[tokio::test]
    async fn issues_a_self_signed_certificate_and_marks_ready() {
        let (reconciler, certificates) = new_reconciler().await;
        certificates.create(sample_cert()).await.unwrap();

        reconciler.sync("default/web").await.unwrap();

        let updated = certificates.get("default/web").await.unwrap().unwrap();
        assert!(has_ready_true(&updated.status.conditions));
        assert!(updated.status.not_after.is_some());
    }

    #[tokio::test]
    async fn second_reconcile_is_a_no_op_once_issued() {
        let (reconciler, certificates) = new_reconciler().await;
        certificates.create(sample_cert()).await.unwrap();

        reconciler.sync("default/web").await.unwrap();
        let after_first = certificates.get("default/web").await.unwrap().unwrap();

        reconciler.sync("default/web").await.unwrap();
        let after_second = certificates.get("default/web").await.unwrap().unwrap();

        assert_eq!(after_first.status.not_after, after_second.status.not_after);
    }

    #[tokio::test]
    async fn unknown_issuer_surfaces_a_retriable_error() {
        let (reconciler, certificates) = new_reconciler().await;
        let mut crt = sample_cert();
        crt.spec.issuer_ref.name = "missing".to_string();
        certificates.create(crt).await.unwrap();

        let err = reconciler.sync("default/web").await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn acme_v1_issuer_fails_config_without_requeue_storm() {
        use crate::resource::{AcmeIssuerSpec, IssuerStatus};

        let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
        let certificates: Arc<dyn ResourceStore<Certificate>> = Arc::new(FakeResourceStore::new());
        let issuers: Arc<dyn ResourceStore<Issuer>> = Arc::new(FakeResourceStore::new());
        let cluster_issuers: Arc<dyn ResourceStore<Issuer>> = Arc::new(FakeResourceStore::new());
        let secrets: Arc<dyn SecretStore> = Arc::new(FakeSecretStore::new());
        let orders: Arc<dyn ResourceStore<Order>> = Arc::new(FakeResourceStore::new());

        issuers
            .create(Issuer {
                metadata: ObjectMeta::namespaced("letsencrypt-v1", "default"),
                spec: IssuerSpec::Acme(AcmeIssuerSpec {
                    server: "https://acme-v01.api.letsencrypt.org/directory".to_string(),
                    email: None,
                    private_key_secret_name: "acme-account-key".to_string(),
                }),
                status: IssuerStatus::default(),
            })
            .await
            .unwrap();

        let deps = IssuerDeps {
            secrets: secrets.clone(),
            orders,
            clock: clock.clone(),
            http_client: reqwest::Client::new(),
        };
        let issuer_factory = Arc::new(IssuerFactory::new(IssuerRegistry::with_defaults(), deps));
        let reconciler = CertificateReconciler::new(
            certificates.clone(),
            issuers.clone(),
            cluster_issuers,
            secrets,
            issuer_factory,
            clock,
            Arc::new(FakeEventRecorder::new()),
            Arc::new(NullScheduler),
        );

        let mut crt = sample_cert();
        crt.spec.issuer_ref.name = "letsencrypt-v1".to_string();
        certificates.create(crt).await.unwrap();

        let err = reconciler.sync("default/web").await.unwrap_err();
        assert!(!err.is_retriable());

        let issuer = issuers.get("default/letsencrypt-v1").await.unwrap().unwrap();
        let ready = issuer.status.conditions.iter().find(|c| c.kind == "Ready").unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "FailedConfig");
        assert!(ready.message.contains("acme-v02.api.letsencrypt.org"));

        let crt = certificates.get("default/web").await.unwrap().unwrap();
        let crt_ready = crt.status.conditions.iter().find(|c| c.kind == "Ready").unwrap();
        assert_eq!(crt_ready.reason, "IssuerNotReady");
    }
}
