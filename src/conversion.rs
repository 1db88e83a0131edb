//! Version-tolerant conversion between CRD schema versions, mirroring the
//! teacher's scheme-dispatched ACME directory resolution (`ca.rs`'s
//! `Environment`/URL table) generalized into a two-version conversion pair.
//!
//! `v1alpha1` is the earliest schema this crate still accepts on the wire;
//! `v1` (`crate::resource::CertificateSpec`) is current. Fields `v1alpha1`
//! has no room for are round-tripped through a single JSON-blob annotation
//! rather than dropped, so `v1 -> v1alpha1 -> v1` is lossless for any
//! `CertificateSpec` that already passes [`crate::validation::validate_certificate_spec`].
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::{CertificateSpec, IssuerRef, KeySpec, Usage};

pub const ANNOTATION_CONVERSION_DATA: &str = "certmanager.k8s.io/v1alpha1-conversion-data";

/// The oldest schema this crate still reads: no IP/URI SANs, no usage
/// list, no explicit duration/renewBefore/isCa overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateSpecV1Alpha1 {
    pub secret_name: String,
    pub issuer_ref: IssuerRef,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub key: KeySpec,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Fields `v1alpha1` cannot represent, stashed verbatim in
/// [`ANNOTATION_CONVERSION_DATA`] so they survive a round trip through an
/// older client that only understands the `v1alpha1` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
struct NewOnlyFields {
    #[serde(default)]
    ip_addresses: Vec<String>,
    #[serde(default)]
    uri_sans: Vec<String>,
    #[serde(default)]
    usages: Vec<Usage>,
    #[serde(default)]
    duration_seconds: Option<i64>,
    #[serde(default)]
    renew_before_seconds: Option<i64>,
    #[serde(default)]
    is_ca: bool,
}

/// Downgrade `v1` to `v1alpha1` for a client that has not yet been
/// upgraded. Lossy only in the sense that the extra fields move from
/// first-class spec fields to an annotation; no data is discarded.
pub fn v1_to_v1alpha1(spec: &CertificateSpec) -> CertificateSpecV1Alpha1 {
    let extra = NewOnlyFields {
        ip_addresses: spec.ip_addresses.clone(),
        uri_sans: spec.uri_sans.clone(),
        usages: spec.usages.clone(),
        duration_seconds: spec.duration_seconds,
        renew_before_seconds: spec.renew_before_seconds,
        is_ca: spec.is_ca,
    };

    let mut annotations = BTreeMap::new();
    if extra != NewOnlyFields::default() {
        if let Ok(encoded) = serde_json::to_string(&extra) {
            annotations.insert(ANNOTATION_CONVERSION_DATA.to_string(), encoded);
        }
    }

    CertificateSpecV1Alpha1 {
        secret_name: spec.secret_name.clone(),
        issuer_ref: spec.issuer_ref.clone(),
        common_name: spec.common_name.clone(),
        dns_names: spec.dns_names.clone(),
        key: spec.key.clone(),
        annotations,
    }
}

/// Upgrade `v1alpha1` to `v1`, recovering any fields stashed by
/// [`v1_to_v1alpha1`] from the fallback annotation. Fields with no
/// recoverable data default as `v1` itself defaults them.
pub fn v1alpha1_to_v1(spec: &CertificateSpecV1Alpha1) -> CertificateSpec {
    let extra = spec
        .annotations
        .get(ANNOTATION_CONVERSION_DATA)
        .and_then(|encoded| serde_json::from_str::<NewOnlyFields>(encoded).ok())
        .unwrap_or_default();

    CertificateSpec {
        secret_name: spec.secret_name.clone(),
        issuer_ref: spec.issuer_ref.clone(),
        common_name: spec.common_name.clone(),
        dns_names: spec.dns_names.clone(),
        ip_addresses: extra.ip_addresses,
        uri_sans: extra.uri_sans,
        duration_seconds: extra.duration_seconds,
        renew_before_seconds: extra.renew_before_seconds,
        key: spec.key.clone(),
        is_ca: extra.is_ca,
        usages: extra.usages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{IssuerRef, KeySpec};

    fn sample() -> CertificateSpec {
        CertificateSpec {
            secret_name: "web-tls".to_string(),
            issuer_ref: IssuerRef {
                name: "letsencrypt-prod".to_string(),
                kind: None,
            },
            common_name: Some("example.com".to_string()),
            dns_names: vec!["example.com".to_string(), "www.example.com".to_string()],
            ip_addresses: vec!["10.0.0.1".to_string()],
            uri_sans: vec!["spiffe://cluster/web".to_string()],
            duration_seconds: Some(3600 * 24 * 60),
            renew_before_seconds: Some(3600 * 24 * 15),
            key: KeySpec::default(),
            is_ca: false,
            usages: vec![Usage::ServerAuth, Usage::DigitalSignature],
        }
    }

    #[test]
    fn downgrade_stashes_new_fields_in_annotation() {
        let downgraded = v1_to_v1alpha1(&sample());
        assert!(downgraded.annotations.contains_key(ANNOTATION_CONVERSION_DATA));
        assert_eq!(downgraded.dns_names, sample().dns_names);
    }

    #[test]
    fn round_trip_through_v1alpha1_is_lossless() {
        let original = sample();
        let downgraded = v1_to_v1alpha1(&original);
        let upgraded = v1alpha1_to_v1(&downgraded);
        assert_eq!(upgraded, original);
    }

    #[test]
    fn upgrade_without_annotation_defaults_new_fields() {
        let old = CertificateSpecV1Alpha1 {
            secret_name: "web-tls".to_string(),
            issuer_ref: IssuerRef {
                name: "letsencrypt-prod".to_string(),
                kind: None,
            },
            common_name: None,
            dns_names: vec!["example.com".to_string()],
            key: KeySpec::default(),
            annotations: BTreeMap::new(),
        };
        let upgraded = v1alpha1_to_v1(&old);
        assert!(upgraded.ip_addresses.is_empty());
        assert!(upgraded.usages.is_empty());
        assert!(!upgraded.is_ca);
    }
}
