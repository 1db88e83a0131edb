//! The cluster resource data model: `Certificate`, `Issuer`/`ClusterIssuer`,
//! `Order`, `Challenge`, and the `Secret` shape the reconciler produces.
//!
//! These are plain data types with no client attached — the reconciler
//! talks to them only through the `ResourceStore`/`SecretStore` seams in
//! [`crate::store`]. Field names and invariants follow the certificate
//! lifecycle model this crate reconciles against.
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::types::ChallengeType;

/// Minimal object metadata: enough for optimistic concurrency and
/// namespaced/cluster-scoped lookups, without a real API server behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Bumped by the store on every successful write; reconcilers pass
    /// back the version they observed and the write is rejected if it has
    /// since changed.
    #[serde(default)]
    pub resource_version: u64,
    /// Bumped only on spec changes, used to invalidate cached issuer
    /// instances (C5) without comparing the whole spec.
    #[serde(default)]
    pub generation: u64,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            resource_version: 0,
            generation: 0,
        }
    }

    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            resource_version: 0,
            generation: 0,
        }
    }

    /// The key used by `ResourceStore`/`SecretStore`: `namespace/name` or
    /// just `name` for cluster-scoped resources.
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A status condition, carrying `message` and `last_transition_time`
/// alongside `reason` so the reconciler can decide whether a condition
/// actually changed before bumping `resource_version` (see SPEC_FULL §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    pub kind: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Condition {
    pub fn ready(status: ConditionStatus, reason: impl Into<String>, message: impl Into<String>, now: Timestamp) -> Self {
        Self {
            kind: "Ready".to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }

    /// Update in place, returning `true` only if something actually
    /// changed (used to decide whether a status write is needed at all).
    pub fn set(&mut self, status: ConditionStatus, reason: &str, message: &str, now: Timestamp) -> bool {
        if self.status == status && self.reason == reason && self.message == message {
            return false;
        }
        self.status = status;
        self.reason = reason.to_string();
        self.message = message.to_string();
        self.last_transition_time = now;
        true
    }
}

fn find_condition<'a>(conditions: &'a [Condition], kind: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.kind == kind)
}

pub fn has_ready_true(conditions: &[Condition]) -> bool {
    find_condition(conditions, "Ready")
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum IssuerRefKind {
    Issuer,
    ClusterIssuer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuerRef {
    pub name: String,
    #[serde(default)]
    pub kind: Option<IssuerRefKind>,
}

impl IssuerRef {
    pub fn kind_or_default(&self) -> IssuerRefKind {
        self.kind.unwrap_or(IssuerRefKind::Issuer)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Rsa,
    Ecdsa,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyEncoding {
    Pkcs1,
    Pkcs8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeySpec {
    pub algorithm: KeyAlgorithm,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub encoding: Option<KeyEncoding>,
}

impl Default for KeySpec {
    fn default() -> Self {
        // Upstream defaults to RSA-2048; this backend's `rcgen` has no RSA
        // keygen path (see `issuer::certgen::generate_key_pair`), so a
        // Certificate that does not pin `algorithm` gets a key this crate
        // can actually produce instead of an immediate `Configuration` error.
        Self {
            algorithm: KeyAlgorithm::Ecdsa,
            size: None,
            encoding: None,
        }
    }
}

/// One of the four issuer backends. Exactly one variant is populated,
/// mirroring the original resource's "exactly one of" union.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IssuerSpec {
    Acme(AcmeIssuerSpec),
    Ca(CaIssuerSpec),
    SelfSigned(SelfSignedIssuerSpec),
    Vault(VaultIssuerSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcmeIssuerSpec {
    pub server: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Secret holding the ACME account private key.
    pub private_key_secret_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaIssuerSpec {
    /// Secret holding the signing keypair (`tls.key`/`tls.crt`).
    pub secret_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SelfSignedIssuerSpec {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultIssuerSpec {
    pub server: String,
    pub path: String,
    pub token_secret_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IssuerStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Set once an ACME account has been registered.
    #[serde(default)]
    pub acme_account_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    pub metadata: ObjectMeta,
    pub spec: IssuerSpec,
    #[serde(default)]
    pub status: IssuerStatus,
}

/// A `ClusterIssuer` has an identical spec/status shape to `Issuer` but is
/// cluster-scoped (no namespace); kept as a distinct type so
/// `IssuerRefKind` dispatch at the store layer is a type-level choice.
pub type ClusterIssuer = Issuer;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum Usage {
    ServerAuth,
    ClientAuth,
    DigitalSignature,
    KeyEncipherment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateSpec {
    pub secret_name: String,
    pub issuer_ref: IssuerRef,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub uri_sans: Vec<String>,
    /// Seconds. Defaults to 90 days if unset.
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    /// Seconds. Defaults to 30 days if unset.
    #[serde(default)]
    pub renew_before_seconds: Option<i64>,
    #[serde(default)]
    pub key: KeySpec,
    #[serde(default)]
    pub is_ca: bool,
    #[serde(default)]
    pub usages: Vec<Usage>,
}

pub const DEFAULT_DURATION_SECONDS: i64 = 90 * 24 * 3600;
pub const DEFAULT_RENEW_BEFORE_SECONDS: i64 = 30 * 24 * 3600;
pub const MIN_DURATION_SECONDS: i64 = 3600;
pub const MIN_RENEW_BEFORE_SECONDS: i64 = 5 * 60;

impl CertificateSpec {
    pub fn duration_seconds(&self) -> i64 {
        self.duration_seconds.unwrap_or(DEFAULT_DURATION_SECONDS)
    }

    pub fn renew_before_seconds(&self) -> i64 {
        self.renew_before_seconds.unwrap_or(DEFAULT_RENEW_BEFORE_SECONDS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CertificateStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub last_failure_time: Option<Timestamp>,
    #[serde(default)]
    pub order_ref: Option<String>,
    #[serde(default)]
    pub not_after: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub metadata: ObjectMeta,
    pub spec: CertificateSpec,
    #[serde(default)]
    pub status: CertificateStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OrderState {
    Pending,
    Processing,
    Ready,
    Valid,
    Failed,
    Expired,
    Errored,
}

impl OrderState {
    pub fn is_failure(&self) -> bool {
        matches!(self, OrderState::Failed | OrderState::Expired | OrderState::Errored)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub issuer_ref: IssuerRef,
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub solver_config: Vec<SolverConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolverConfig {
    pub dns_name: String,
    pub challenge_kind: ChallengeType,
}

/// 32-bit checksum over the fields of an `OrderSpec` that identify a
/// particular ACME order attempt: issuer ref, sorted DNS names, and sorted
/// solver config. Used by the ACME issuer's `Prepare` step to detect spec
/// drift (SPEC_FULL §4.6) without comparing whole objects.
pub fn order_fingerprint(spec: &OrderSpec) -> u32 {
    let mut dns_names = spec.dns_names.clone();
    dns_names.sort();

    let mut solver_config = spec.solver_config.clone();
    solver_config.sort_by(|a, b| {
        a.dns_name
            .cmp(&b.dns_name)
            .then((a.challenge_kind as u8).cmp(&(b.challenge_kind as u8)))
    });

    #[derive(Serialize)]
    struct FingerprintInput<'a> {
        issuer_ref: &'a IssuerRef,
        dns_names: Vec<String>,
        solver_config: Vec<SolverConfig>,
    }

    let input = FingerprintInput {
        issuer_ref: &spec.issuer_ref,
        dns_names,
        solver_config,
    };
    let encoded = serde_json::to_vec(&input).expect("OrderSpec fingerprint input is serializable");
    adler32(&encoded)
}

/// Minimal Adler-32 implementation (RFC 1950 §8.2) so fingerprinting has no
/// extra crate dependency beyond what the rest of the crate already pulls in.
fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65521;
    let (mut a, mut b) = (1u32, 0u32);
    for &byte in data {
        a = (a + byte as u32) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderStatus {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub finalize_url: Option<String>,
    #[serde(default)]
    pub state: Option<OrderState>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub failure_time: Option<Timestamp>,
    #[serde(default)]
    pub certificate_pem: Option<String>,
    /// PEM-encoded private key matching `certificate_pem`'s CSR, generated
    /// by the order reconciler just before finalization and handed back to
    /// the ACME issuer's `issue`/`renew` alongside the certificate chain.
    #[serde(default)]
    pub private_key_pem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub metadata: ObjectMeta,
    pub spec: OrderSpec,
    #[serde(default)]
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeState {
    Pending,
    Presenting,
    Presented,
    Accepted,
    Failed,
    Errored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSpec {
    pub dns_name: String,
    pub kind: ChallengeType,
    pub token: String,
    pub key_authorization: String,
    /// ACME challenge-object URL to POST the ready signal to.
    pub url: String,
    /// ACME authorization-object URL the order reconciler polls for this
    /// challenge's terminal valid/invalid state. Distinct from `url`, which
    /// names the challenge sub-resource, not the authorization it belongs to.
    pub authorization_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChallengeStatus {
    #[serde(default)]
    pub state: Option<ChallengeState>,
    #[serde(default)]
    pub processing: bool,
    #[serde(default)]
    pub presented: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub metadata: ObjectMeta,
    pub spec: ChallengeSpec,
    #[serde(default)]
    pub status: ChallengeStatus,
}

/// The `kubernetes.io/tls`-shaped secret the reconciler upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    pub tls_crt: Vec<u8>,
    pub tls_key: Vec<u8>,
    #[serde(default)]
    pub ca_crt: Option<Vec<u8>>,
    #[serde(default)]
    pub annotations: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

pub const ANNOTATION_ALT_NAMES: &str = "certmanager.k8s.io/alt-names";
pub const ANNOTATION_COMMON_NAME: &str = "certmanager.k8s.io/common-name";
pub const ANNOTATION_ISSUER_NAME: &str = "certmanager.k8s.io/issuer-name";
pub const ANNOTATION_ISSUER_KIND: &str = "certmanager.k8s.io/issuer-kind";
pub const ANNOTATION_ACME_REGISTERED_AT: &str = "certmanager.k8s.io/acme-registered-at";
pub const LABEL_CERTIFICATE_NAME: &str = "certmanager.k8s.io/certificate-name";

macro_rules! impl_versioned {
    ($($ty:ty),* $(,)?) => {
        $(
            impl crate::store::Versioned for $ty {
                fn store_key(&self) -> String {
                    self.metadata.key()
                }
                fn resource_version(&self) -> u64 {
                    self.metadata.resource_version
                }
                fn set_resource_version(&mut self, version: u64) {
                    self.metadata.resource_version = version;
                }
            }
        )*
    };
}

impl_versioned!(Certificate, Issuer, Order, Challenge);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_meta_key_namespaced() {
        let m = ObjectMeta::namespaced("web-tls", "default");
        assert_eq!(m.key(), "default/web-tls");
    }

    #[test]
    fn object_meta_key_cluster_scoped() {
        let m = ObjectMeta::new("letsencrypt-prod");
        assert_eq!(m.key(), "letsencrypt-prod");
    }

    #[test]
    fn condition_set_reports_unchanged() {
        let now = Timestamp::now();
        let mut c = Condition::ready(ConditionStatus::True, "Verified", "ok", now);
        assert!(!c.set(ConditionStatus::True, "Verified", "ok", now));
        assert!(c.set(ConditionStatus::False, "FailedVerify", "nope", now));
    }

    #[test]
    fn has_ready_true_detects_condition() {
        let now = Timestamp::now();
        let conditions = vec![Condition::ready(ConditionStatus::True, "Verified", "ok", now)];
        assert!(has_ready_true(&conditions));
    }

    fn sample_order_spec(dns_names: Vec<&str>) -> OrderSpec {
        OrderSpec {
            issuer_ref: IssuerRef {
                name: "letsencrypt-prod".to_string(),
                kind: None,
            },
            dns_names: dns_names.into_iter().map(String::from).collect(),
            common_name: None,
            solver_config: vec![],
        }
    }

    #[test]
    fn fingerprint_is_order_insensitive() {
        let a = order_fingerprint(&sample_order_spec(vec!["a.example.com", "b.example.com"]));
        let b = order_fingerprint(&sample_order_spec(vec!["b.example.com", "a.example.com"]));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_dns_names() {
        let a = order_fingerprint(&sample_order_spec(vec!["a.example.com"]));
        let b = order_fingerprint(&sample_order_spec(vec!["a.example.com", "c.example.com"]));
        assert_ne!(a, b);
    }
}
