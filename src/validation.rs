//! Admission-time validation for the CRD data model in [`crate::resource`],
//! grounded in the same field-path-qualified error shape the teacher uses
//! for ACME subproblems (`types::AcmeSubproblem`), generalized from a single
//! wire-protocol error list into a reusable validator for arbitrary specs.
use crate::resource::{
    CertificateSpec, IssuerSpec, KeyAlgorithm, MIN_DURATION_SECONDS, MIN_RENEW_BEFORE_SECONDS,
};

/// One field-scoped validation failure, e.g. `spec.dnsNames: must not be empty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// All failures found for one object. Empty means the object is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn is_valid(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(path, message));
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self.0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        write!(f, "{joined}")
    }
}

const MAX_COMMON_NAME_LEN: usize = 64;
const MIN_RSA_SIZE: u32 = 2048;
const MAX_RSA_SIZE: u32 = 8192;
const VALID_ECDSA_SIZES: [u32; 3] = [256, 384, 521];

/// Validate a `CertificateSpec` against the invariants the reconciler (C4)
/// assumes hold for every object it pulls off the work queue. Pure and
/// side-effect free so it can run identically in an admission webhook and
/// in the reconciler's own defensive re-check.
pub fn validate_certificate_spec(spec: &CertificateSpec) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    if spec.secret_name.trim().is_empty() {
        errors.push("spec.secretName", "must not be empty");
    }

    let has_common_name = spec.common_name.as_deref().is_some_and(|cn| !cn.is_empty());
    let has_dns_names = !spec.dns_names.is_empty();
    let has_uri_sans = !spec.uri_sans.is_empty();
    if !has_common_name && !has_dns_names && !has_uri_sans {
        errors.push(
            "spec",
            "at least one of commonName, dnsNames, or uriSANs must be set",
        );
    }

    if let Some(cn) = &spec.common_name {
        if cn.len() > MAX_COMMON_NAME_LEN {
            errors.push(
                "spec.commonName",
                format!("must be {MAX_COMMON_NAME_LEN} characters or fewer"),
            );
        }
    }

    for (i, name) in spec.dns_names.iter().enumerate() {
        if name.trim().is_empty() {
            errors.push(format!("spec.dnsNames[{i}]"), "must not be empty");
        }
    }

    let duration = spec.duration_seconds();
    let renew_before = spec.renew_before_seconds();

    if duration < MIN_DURATION_SECONDS {
        errors.push(
            "spec.duration",
            format!("must be at least {MIN_DURATION_SECONDS} seconds"),
        );
    }
    if renew_before < MIN_RENEW_BEFORE_SECONDS {
        errors.push(
            "spec.renewBefore",
            format!("must be at least {MIN_RENEW_BEFORE_SECONDS} seconds"),
        );
    }
    if duration <= renew_before {
        errors.push("spec.renewBefore", "must be less than spec.duration");
    }

    match spec.key.algorithm {
        KeyAlgorithm::Rsa => {
            if let Some(size) = spec.key.size {
                if !(MIN_RSA_SIZE..=MAX_RSA_SIZE).contains(&size) {
                    errors.push(
                        "spec.key.size",
                        format!("RSA key size must be between {MIN_RSA_SIZE} and {MAX_RSA_SIZE}"),
                    );
                }
            }
        }
        KeyAlgorithm::Ecdsa => {
            if let Some(size) = spec.key.size {
                if !VALID_ECDSA_SIZES.contains(&size) {
                    errors.push(
                        "spec.key.size",
                        format!("ECDSA key size must be one of {VALID_ECDSA_SIZES:?}"),
                    );
                }
            }
        }
    }

    errors
}

/// The Letsencrypt v1 directory host, still occasionally configured by
/// copy-pasted older docs. There is no automatic way to keep issuing
/// against it, so setup is refused outright with a pointer to the v2
/// equivalent rather than attempting (and failing) registration.
const LETSENCRYPT_V1_HOST: &str = "acme-v01.api.letsencrypt.org";
const LETSENCRYPT_V2_DIRECTORY: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Whether `server` names a known ACME v1 directory, per SPEC_FULL §6/§8
/// scenario 6.
pub fn is_acme_v1_url(server: &str) -> bool {
    server.contains(LETSENCRYPT_V1_HOST) || server.contains("/acme/v1/") || server.contains("acme/directory/v1")
}

/// Validate an `IssuerSpec`: exactly one backend variant may be populated.
/// `IssuerSpec` is already an enum at the type level so this mostly checks
/// the fields of whichever variant is present.
pub fn validate_issuer_spec(spec: &IssuerSpec) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    match spec {
        IssuerSpec::Acme(acme) => {
            if acme.server.trim().is_empty() {
                errors.push("spec.acme.server", "must not be empty");
            } else if is_acme_v1_url(&acme.server) {
                errors.push(
                    "spec.acme.server",
                    format!(
                        "ACME v1 directory URLs are not supported, use {LETSENCRYPT_V2_DIRECTORY} instead"
                    ),
                );
            }
            if acme.private_key_secret_name.trim().is_empty() {
                errors.push("spec.acme.privateKeySecretName", "must not be empty");
            }
        }
        IssuerSpec::Ca(ca) => {
            if ca.secret_name.trim().is_empty() {
                errors.push("spec.ca.secretName", "must not be empty");
            }
        }
        IssuerSpec::SelfSigned(_) => {}
        IssuerSpec::Vault(vault) => {
            if vault.server.trim().is_empty() {
                errors.push("spec.vault.server", "must not be empty");
            }
            if vault.path.trim().is_empty() {
                errors.push("spec.vault.path", "must not be empty");
            }
            if vault.token_secret_name.trim().is_empty() {
                errors.push("spec.vault.tokenSecretName", "must not be empty");
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AcmeIssuerSpec, IssuerRef, KeySpec, SelfSignedIssuerSpec};

    fn valid_spec() -> CertificateSpec {
        CertificateSpec {
            secret_name: "web-tls".to_string(),
            issuer_ref: IssuerRef {
                name: "letsencrypt-prod".to_string(),
                kind: None,
            },
            common_name: None,
            dns_names: vec!["example.com".to_string()],
            ip_addresses: vec![],
            uri_sans: vec![],
            duration_seconds: None,
            renew_before_seconds: None,
            key: KeySpec::default(),
            is_ca: false,
            usages: vec![],
        }
    }

    #[test]
    fn accepts_a_well_formed_spec() {
        assert!(validate_certificate_spec(&valid_spec()).is_valid());
    }

    #[test]
    fn rejects_empty_secret_name() {
        let mut spec = valid_spec();
        spec.secret_name = String::new();
        let errors = validate_certificate_spec(&spec);
        assert!(!errors.is_valid());
        assert!(errors.0.iter().any(|e| e.path == "spec.secretName"));
    }

    #[test]
    fn rejects_spec_with_no_names_at_all() {
        let mut spec = valid_spec();
        spec.dns_names.clear();
        let errors = validate_certificate_spec(&spec);
        assert!(errors.0.iter().any(|e| e.path == "spec"));
    }

    #[test]
    fn rejects_renew_before_at_or_past_duration() {
        let mut spec = valid_spec();
        spec.duration_seconds = Some(3600 * 24);
        spec.renew_before_seconds = Some(3600 * 24);
        let errors = validate_certificate_spec(&spec);
        assert!(errors.0.iter().any(|e| e.path == "spec.renewBefore"));
    }

    #[test]
    fn rejects_invalid_rsa_size() {
        let mut spec = valid_spec();
        spec.key = KeySpec {
            algorithm: KeyAlgorithm::Rsa,
            size: Some(1024),
            encoding: None,
        };
        let errors = validate_certificate_spec(&spec);
        assert!(errors.0.iter().any(|e| e.path == "spec.key.size"));
    }

    #[test]
    fn rsa_size_boundaries() {
        let rsa = |size| KeySpec {
            algorithm: KeyAlgorithm::Rsa,
            size: Some(size),
            encoding: None,
        };
        let mut spec = valid_spec();

        spec.key = rsa(2047);
        assert!(!validate_certificate_spec(&spec).is_valid());

        spec.key = rsa(2048);
        assert!(validate_certificate_spec(&spec).is_valid());

        spec.key = rsa(8192);
        assert!(validate_certificate_spec(&spec).is_valid());

        spec.key = rsa(8193);
        assert!(!validate_certificate_spec(&spec).is_valid());
    }

    #[test]
    fn duration_boundary_one_hour_renew_before_five_minutes_is_accepted() {
        let mut spec = valid_spec();
        spec.duration_seconds = Some(3600);
        spec.renew_before_seconds = Some(5 * 60);
        assert!(validate_certificate_spec(&spec).is_valid());
    }

    #[test]
    fn common_name_longer_than_64_chars_is_rejected() {
        let mut spec = valid_spec();
        spec.common_name = Some("a".repeat(65));
        let errors = validate_certificate_spec(&spec);
        assert!(errors.0.iter().any(|e| e.path == "spec.commonName"));
    }

    #[test]
    fn validation_is_idempotent() {
        let spec = valid_spec();
        let first = validate_certificate_spec(&spec);
        let second = validate_certificate_spec(&spec);
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_acme_v1_directory() {
        let spec = IssuerSpec::Acme(AcmeIssuerSpec {
            server: "https://acme-v01.api.letsencrypt.org/directory".to_string(),
            email: None,
            private_key_secret_name: "acme-key".to_string(),
        });
        let errors = validate_issuer_spec(&spec);
        assert!(!errors.is_valid());
        assert!(errors
            .0
            .iter()
            .any(|e| e.path == "spec.acme.server" && e.message.contains(LETSENCRYPT_V2_DIRECTORY)));
    }

    #[test]
    fn is_acme_v1_url_detects_known_letsencrypt_v1_host() {
        assert!(is_acme_v1_url("https://acme-v01.api.letsencrypt.org/directory"));
        assert!(!is_acme_v1_url("https://acme-v02.api.letsencrypt.org/directory"));
    }

    #[test]
    fn self_signed_has_no_required_fields() {
        let spec = IssuerSpec::SelfSigned(SelfSignedIssuerSpec::default());
        assert!(validate_issuer_spec(&spec).is_valid());
    }
}
