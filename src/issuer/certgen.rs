//! Shared X.509 generation helpers used by the self-signed issuer, the
//! CA-signed issuer, and the webhook bootstrap controller (C8) — all three
//! ultimately call `rcgen` the same way the teacher's `order/csr.rs` does
//! for ACME CSRs, just self-signing or cross-signing instead of emitting a
//! certificate signing request.
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, Ia5String, IsCa, KeyPair,
    KeyUsagePurpose,
};
use time::{Duration as TimeDuration, OffsetDateTime};

use crate::error::{AcmeError, Result};
use crate::resource::{KeyAlgorithm, KeySpec};

/// Generate a key pair matching `spec`.
///
/// `rcgen` can generate ECDSA keys directly but has no RSA key-generation
/// path of its own (RSA support is sign-only, for keys generated
/// elsewhere). Rather than silently handing back a different key algorithm
/// than the certificate requested, RSA is refused here with a
/// non-retriable error; `validate_certificate_spec` still accepts
/// `algorithm=rsa` on the spec since that validation only checks the size
/// bound, not what this crate's crypto backend can actually produce.
pub fn generate_key_pair(spec: &KeySpec) -> Result<KeyPair> {
    match spec.algorithm {
        KeyAlgorithm::Ecdsa => {
            let alg = match spec.size.unwrap_or(256) {
                384 | 521 => &rcgen::PKCS_ECDSA_P384_SHA384,
                _ => &rcgen::PKCS_ECDSA_P256_SHA256,
            };
            KeyPair::generate_for(alg)
                .map_err(|e| AcmeError::crypto(format!("failed to generate ECDSA key: {e}")))
        }
        KeyAlgorithm::Rsa => Err(AcmeError::configuration(
            "RSA key generation is not supported by this issuer backend (rcgen has no RSA keygen path); use algorithm=ecdsa instead",
        )),
    }
}

/// Build `CertificateParams` for a leaf or CA certificate.
///
/// `sans` may mix DNS names and IP address literals; `rcgen::CertificateParams::new`
/// classifies each string automatically. `uri_sans` are pushed separately
/// since `rcgen` does not fold them into the constructor's SAN list.
pub fn build_params(
    common_name: Option<&str>,
    sans: &[String],
    uri_sans: &[String],
    is_ca: bool,
    duration: std::time::Duration,
) -> Result<CertificateParams> {
    let mut params = CertificateParams::new(sans.to_vec())
        .map_err(|e| AcmeError::crypto(format!("failed to build certificate params: {e}")))?;

    let mut dn = DistinguishedName::new();
    if let Some(cn) = common_name {
        dn.push(DnType::CommonName, cn);
    }
    params.distinguished_name = dn;

    for uri in uri_sans {
        let ia5 = Ia5String::try_from(uri.as_str())
            .map_err(|e| AcmeError::crypto(format!("invalid URI SAN {uri}: {e}")))?;
        params.subject_alt_names.push(rcgen::SanType::URI(ia5));
    }

    params.is_ca = if is_ca {
        IsCa::Ca(BasicConstraints::Unconstrained)
    } else {
        IsCa::NoCa
    };
    params.key_usages = if is_ca {
        vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign]
    } else {
        vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ]
    };

    let not_before = OffsetDateTime::now_utc();
    let seconds = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
    let not_after = not_before
        .checked_add(TimeDuration::seconds(seconds))
        .ok_or_else(|| AcmeError::crypto("certificate duration overflowed"))?;
    params.not_before = not_before;
    params.not_after = not_after;

    Ok(params)
}

/// PEM-encode a freshly self-signed or CA-signed certificate and its key.
pub struct GeneratedCert {
    pub key_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
}

pub fn self_sign(params: CertificateParams, key_pair: &KeyPair) -> Result<GeneratedCert> {
    let cert = params
        .self_signed(key_pair)
        .map_err(|e| AcmeError::crypto(format!("failed to self-sign certificate: {e}")))?;
    Ok(GeneratedCert {
        key_pem: key_pair.serialize_pem().into_bytes(),
        cert_pem: cert.pem().into_bytes(),
    })
}

pub fn sign_with_ca(
    params: CertificateParams,
    leaf_key: &KeyPair,
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> Result<GeneratedCert> {
    let ca_key = KeyPair::from_pem(ca_key_pem)
        .map_err(|e| AcmeError::crypto(format!("failed to parse CA key: {e}")))?;
    let ca_params = rcgen::CertificateParams::from_ca_cert_pem(ca_cert_pem)
        .map_err(|e| AcmeError::crypto(format!("failed to parse CA certificate: {e}")))?;
    let ca_cert = ca_params
        .self_signed(&ca_key)
        .map_err(|e| AcmeError::crypto(format!("failed to reconstruct CA certificate: {e}")))?;

    let leaf_cert = params
        .signed_by(leaf_key, &ca_cert, &ca_key)
        .map_err(|e| AcmeError::crypto(format!("failed to sign leaf certificate: {e}")))?;

    Ok(GeneratedCert {
        key_pem: leaf_key.serialize_pem().into_bytes(),
        cert_pem: leaf_cert.pem().into_bytes(),
    })
}

/// The `SubjectPublicKeyInfo` DER for a PEM-encoded private key, so a stored
/// certificate's public key can be compared against a stored private key
/// without parsing the certificate's whole ASN.1 structure.
pub fn public_key_der_from_private_pem(private_key_pem: &str) -> Result<Vec<u8>> {
    let key_pair = KeyPair::from_pem(private_key_pem)
        .map_err(|e| AcmeError::crypto(format!("failed to parse private key: {e}")))?;
    Ok(key_pair.public_key_der())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::KeyAlgorithm;

    #[test]
    fn self_signs_a_leaf_certificate() {
        let spec = KeySpec {
            algorithm: KeyAlgorithm::Ecdsa,
            size: Some(256),
            encoding: None,
        };
        let key = generate_key_pair(&spec).unwrap();
        let params = build_params(
            Some("a.example.com"),
            &["a.example.com".to_string()],
            &[],
            false,
            std::time::Duration::from_secs(24 * 3600),
        )
        .unwrap();
        let generated = self_sign(params, &key).unwrap();
        assert!(String::from_utf8(generated.cert_pem).unwrap().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn rsa_key_requests_are_refused_instead_of_silently_substituted() {
        let spec = KeySpec {
            algorithm: KeyAlgorithm::Rsa,
            size: Some(2048),
            encoding: None,
        };
        let err = generate_key_pair(&spec).unwrap_err();
        assert!(!err.is_retriable());
    }

    #[test]
    fn ca_cert_is_self_signed_and_marked_ca() {
        let spec = KeySpec {
            algorithm: KeyAlgorithm::Ecdsa,
            size: Some(256),
            encoding: None,
        };
        let key = generate_key_pair(&spec).unwrap();
        let params = build_params(
            Some("cert-manager.webhook.ca"),
            &[],
            &[],
            true,
            std::time::Duration::from_secs(5 * 365 * 24 * 3600),
        )
        .unwrap();
        let generated = self_sign(params, &key).unwrap();
        assert!(!generated.key_pem.is_empty());
    }
}
