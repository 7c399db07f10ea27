//! # X.509 Issuance
//!
//! Issues one P-256 certificate/key pair for an `X509Claim`.
//!
//! - Leaf certificates: `digitalSignature`, `keyEncipherment`, EKU `serverAuth` + `clientAuth`,
//!   written as `tls.crt` / `tls.key`
//! - CA certificates: `keyCertSign`, `cRLSign`, `digitalSignature`, no EKU,
//!   written as `ca.crt` / `ca.key`
//!
//! Every issuance generates a new key. Certificates are self-signed unless a
//! `CertificateAuthority` is passed in. A CA-signed certificate carries the
//! CA's subject byte for byte as its issuer, so chains build even when the CA
//! name repeats attributes or uses string types rcgen would re-encode.

use super::ca::CertificateAuthority;
use super::duration::parse_duration;
use super::IssueError;
use crate::constants::{
    CA_CERT_KEY, CA_PRIVATE_KEY_KEY, NEVER_EXPIRES_UNIX_SECS, PEM_CERTIFICATE_LABEL, TLS_CERT_KEY,
    TLS_PRIVATE_KEY_KEY,
};
use crate::crd::X509Claim;
use crate::random::{RandomError, SecureRandom};
use crate::store::SecretData;
use p256::pkcs8::{DecodePrivateKey, LineEnding};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    Ia5String, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber, PKCS_ECDSA_P256_SHA256,
    PKCS_ECDSA_P384_SHA384, PKCS_ED25519, PKCS_RSA_SHA256, PKCS_RSA_SHA384, PKCS_RSA_SHA512,
};
use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, RsaEncoding, RsaKeyPair};
use time::OffsetDateTime;
use x509_parser::der_parser::der::{der_read_element_header, parse_der};
use x509_parser::prelude::{FromDer, X509Certificate};
use zeroize::Zeroizing;

/// Everything that determines a certificate besides randomness and the CA
#[derive(Debug, Clone, Copy)]
pub struct CertificateRequest<'a> {
    pub namespace: &'a str,
    pub claim_name: &'a str,
    pub cluster_domain: &'a str,
    pub spec: &'a X509Claim,
    pub not_before: OffsetDateTime,
}

impl CertificateRequest<'_> {
    /// `commonName`, or the claim name when unset
    #[must_use]
    pub fn common_name(&self) -> &str {
        if self.spec.common_name.is_empty() {
            self.claim_name
        } else {
            &self.spec.common_name
        }
    }
}

/// DNS SANs in issuance order: every service expanded to its three names, then the extra names
#[must_use]
pub fn subject_alt_names(spec: &X509Claim, namespace: &str, cluster_domain: &str) -> Vec<String> {
    let mut names = Vec::with_capacity(spec.service_names.len() * 3 + spec.extra_names.len());
    for service in &spec.service_names {
        names.push(service.clone());
        names.push(format!("{service}.{namespace}"));
        names.push(format!("{service}.{namespace}.svc.{cluster_domain}"));
    }
    names.extend(spec.extra_names.iter().cloned());
    names
}

/// Not-after for a certificate starting at `not_before`
///
/// # Errors
///
/// Returns `IssueError::InvalidDuration` for an unparsable `rotate_every`, and
/// `IssueError::Validity` if the end does not fit in a timestamp.
pub fn validity_end(
    rotate_every: &str,
    not_before: OffsetDateTime,
) -> Result<OffsetDateTime, IssueError> {
    if rotate_every.trim().is_empty() {
        return OffsetDateTime::from_unix_timestamp(NEVER_EXPIRES_UNIX_SECS)
            .map_err(|e| IssueError::Validity(e.to_string()));
    }
    let period = parse_duration(rotate_every)?;
    let period = time::Duration::try_from(period).map_err(|e| IssueError::Validity(e.to_string()))?;
    not_before
        .checked_add(period)
        .ok_or_else(|| IssueError::Validity(format!("'{rotate_every}' is out of range")))
}

/// Random serial in [0, 2^127)
fn serial_number(rng: &dyn SecureRandom) -> Result<SerialNumber, RandomError> {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes)?;
    bytes[0] &= 0x7f;
    Ok(SerialNumber::from_slice(&bytes))
}

/// Issue a certificate and private key, returning the Secret payload
///
/// # Errors
///
/// Returns `IssueError` for an invalid validity period or DNS name, an
/// unreadable random source, or a key generation/signing failure.
pub fn issue_certificate(
    request: &CertificateRequest<'_>,
    ca: Option<&CertificateAuthority>,
    rng: &dyn SecureRandom,
) -> Result<SecretData, IssueError> {
    let spec = request.spec;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, request.common_name());
    params.distinguished_name = dn;
    params.serial_number = Some(serial_number(rng)?);
    params.not_before = request.not_before;
    params.not_after = validity_end(&spec.rotate_every, request.not_before)?;

    if spec.is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
    } else {
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
    }

    params.subject_alt_names =
        subject_alt_names(spec, request.namespace, request.cluster_domain)
            .into_iter()
            .map(|name| {
                Ia5String::try_from(name.clone())
                    .map(SanType::DnsName)
                    .map_err(|e| IssueError::InvalidName(format!("'{name}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| IssueError::KeyGeneration(e.to_string()))?;

    let certificate = match ca {
        Some(ca) => params.signed_by(&key_pair, ca.certificate(), ca.key_pair()),
        None => params.self_signed(&key_pair),
    }
    .map_err(|e| IssueError::Signing(e.to_string()))?;
    let cert_pem = match ca {
        Some(ca) => certificate_pem(&with_issuer_of(certificate.der(), ca)?),
        None => certificate.pem(),
    };

    let key_pem = encode_private_key(&key_pair, spec.legacy_private_key_encoding)?;

    let (cert_field, key_field) = if spec.is_ca {
        (CA_CERT_KEY, CA_PRIVATE_KEY_KEY)
    } else {
        (TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY)
    };

    let mut data = SecretData::new();
    data.insert(cert_field.to_string(), cert_pem.into_bytes());
    data.insert(key_field.to_string(), key_pem.as_bytes().to_vec());
    Ok(data)
}

/// `der` with its issuer set to the CA's subject as encoded in the CA certificate
fn with_issuer_of(der: &[u8], ca: &CertificateAuthority) -> Result<Vec<u8>, IssueError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| IssueError::Signing(format!("cannot read issued certificate: {e}")))?;
    let issuer = cert.issuer().as_raw();
    if issuer == ca.subject_der() {
        return Ok(der.to_vec());
    }
    replace_name(der, issuer, ca.subject_der(), ca.key_pair())
}

/// Swap the `Name` at `old` in the TBS of `der` for `new` and sign again with `signer`
///
/// `old` must borrow from `der`: the issuer or subject of a parse of it.
fn replace_name(
    der: &[u8],
    old: &[u8],
    new: &[u8],
    signer: &KeyPair,
) -> Result<Vec<u8>, IssueError> {
    let malformed = |what: String| IssueError::Signing(format!("malformed certificate: {what}"));
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| malformed(e.to_string()))?;
    let tbs = cert.tbs_certificate.as_ref();
    let tbs_start =
        offset_within(der, tbs).ok_or_else(|| malformed("TBS outside certificate".to_string()))?;
    let (tbs_content, _) = der_read_element_header(tbs).map_err(|e| malformed(e.to_string()))?;
    let name_start = offset_within(tbs_content, old)
        .ok_or_else(|| malformed("name outside TBS".to_string()))?;

    let mut content = Vec::with_capacity(tbs_content.len() + new.len());
    content.extend_from_slice(&tbs_content[..name_start]);
    content.extend_from_slice(new);
    content.extend_from_slice(&tbs_content[name_start + old.len()..]);
    let new_tbs = yasna::construct_der(|w| w.write_sequence(|w| w.next().write_der(&content)));

    let after_tbs = &der[tbs_start + tbs.len()..];
    let (rest, _) = parse_der(after_tbs).map_err(|e| malformed(e.to_string()))?;
    let signature_algorithm = &after_tbs[..after_tbs.len() - rest.len()];

    let signature = sign(signer, &new_tbs)?;
    Ok(yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_der(&new_tbs);
            w.next().write_der(signature_algorithm);
            w.next()
                .write_bitvec_bytes(&signature, signature.len() * 8);
        });
    }))
}

/// Position of `inner` inside `outer`, if it is a subslice of it
fn offset_within(outer: &[u8], inner: &[u8]) -> Option<usize> {
    let start = (inner.as_ptr() as usize).checked_sub(outer.as_ptr() as usize)?;
    (start + inner.len() <= outer.len()).then_some(start)
}

/// Signature over `message` in the algorithm rcgen picked for `key_pair`
fn sign(key_pair: &KeyPair, message: &[u8]) -> Result<Vec<u8>, IssueError> {
    let pkcs8 = Zeroizing::new(key_pair.serialize_der());
    let rng = ring::rand::SystemRandom::new();
    let rejected = |e: ring::error::KeyRejected| IssueError::Signing(format!("CA key rejected: {e}"));
    let failed = |e: ring::error::Unspecified| IssueError::Signing(format!("signing failed: {e}"));
    let alg = key_pair.algorithm();

    let ecdsa = if alg == &PKCS_ECDSA_P256_SHA256 {
        Some(&ring::signature::ECDSA_P256_SHA256_ASN1_SIGNING)
    } else if alg == &PKCS_ECDSA_P384_SHA384 {
        Some(&ring::signature::ECDSA_P384_SHA384_ASN1_SIGNING)
    } else {
        None
    };
    if let Some(ecdsa) = ecdsa {
        let key = EcdsaKeyPair::from_pkcs8(ecdsa, &pkcs8, &rng).map_err(rejected)?;
        return Ok(key.sign(&rng, message).map_err(failed)?.as_ref().to_vec());
    }
    if alg == &PKCS_ED25519 {
        let key = Ed25519KeyPair::from_pkcs8_maybe_unchecked(&pkcs8).map_err(rejected)?;
        return Ok(key.sign(message).as_ref().to_vec());
    }

    let padding: &'static dyn RsaEncoding = if alg == &PKCS_RSA_SHA256 {
        &ring::signature::RSA_PKCS1_SHA256
    } else if alg == &PKCS_RSA_SHA384 {
        &ring::signature::RSA_PKCS1_SHA384
    } else if alg == &PKCS_RSA_SHA512 {
        &ring::signature::RSA_PKCS1_SHA512
    } else {
        return Err(IssueError::Signing(format!(
            "unsupported CA signature algorithm {alg:?}"
        )));
    };
    let key = RsaKeyPair::from_pkcs8(&pkcs8).map_err(rejected)?;
    let mut signature = vec![0; key.public().modulus_len()];
    key.sign(padding, &rng, message, &mut signature)
        .map_err(failed)?;
    Ok(signature)
}

/// PEM `CERTIFICATE` block with LF line endings, as rcgen writes them
fn certificate_pem(der: &[u8]) -> String {
    pem::encode_config(
        &pem::Pem::new(PEM_CERTIFICATE_LABEL, der.to_vec()),
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// PEM private key: PKCS#8 `PRIVATE KEY`, or SEC1 `EC PRIVATE KEY` when `legacy`
fn encode_private_key(key_pair: &KeyPair, legacy: bool) -> Result<Zeroizing<String>, IssueError> {
    if !legacy {
        return Ok(Zeroizing::new(key_pair.serialize_pem()));
    }
    let der = Zeroizing::new(key_pair.serialize_der());
    let secret_key = p256::SecretKey::from_pkcs8_der(&der)
        .map_err(|e| IssueError::KeyEncoding(e.to_string()))?;
    secret_key
        .to_sec1_pem(LineEnding::LF)
        .map_err(|e| IssueError::KeyEncoding(e.to_string()))
}
