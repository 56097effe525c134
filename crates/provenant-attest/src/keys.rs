//! Functionary public keys and signature verification.
//!
//! Keys are read either as PEM `SubjectPublicKeyInfo` documents or as
//! securesystemslib JSON keys (`{"keytype", "scheme", "keyval": {"public"}}`).
//! Verification uses `aws-lc-rs`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_ASN1, ECDSA_P384_SHA384_ASN1, ED25519, RSA_PSS_2048_8192_SHA256,
    UnparsedPublicKey, VerificationAlgorithm,
};
use base64::Engine;
use der::Decode;
use der::asn1::ObjectIdentifier;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::AttestationError;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Signature scheme a functionary signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// RSASSA-PSS with SHA-256.
    RsaPss,
    /// ECDSA over P-256 (SHA-256) or P-384 (SHA-384), ASN.1 DER signatures.
    Ecdsa,
    /// Ed25519.
    Ed25519,
}

impl Scheme {
    /// The name used for this scheme in policy documents.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RsaPss => "rsa-pss",
            Self::Ecdsa => "ecdsa",
            Self::Ed25519 => "ed25519",
        }
    }

    /// Whether a securesystemslib `keytype` belongs to this scheme.
    fn accepts_keytype(self, keytype: &str) -> bool {
        match self {
            Self::RsaPss => keytype == "rsa",
            Self::Ecdsa => keytype.starts_with("ecdsa"),
            Self::Ed25519 => keytype == "ed25519",
        }
    }
}

impl FromStr for Scheme {
    type Err = AttestationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa-pss" => Ok(Self::RsaPss),
            "ecdsa" => Ok(Self::Ecdsa),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(AttestationError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A public key bound to the algorithm it verifies signatures with.
pub struct KeyVerifier {
    scheme: Scheme,
    algorithm: &'static dyn VerificationAlgorithm,
    public_key: Vec<u8>,
    key_id: String,
    declared_key_id: bool,
}

impl fmt::Debug for KeyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVerifier")
            .field("scheme", &self.scheme)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// securesystemslib JSON key encoding.
#[derive(Deserialize)]
struct SslibKey {
    keytype: String,
    #[serde(default)]
    keyid: Option<String>,
    keyval: SslibKeyVal,
}

#[derive(Deserialize)]
struct SslibKeyVal {
    public: String,
}

impl KeyVerifier {
    /// Load a public key file under the given scheme.
    pub fn from_file(path: &Path, scheme: Scheme) -> Result<Self, AttestationError> {
        let text = std::fs::read_to_string(path).map_err(|e| AttestationError::io(path, e))?;
        let verifier = Self::from_key_material(&text, scheme)?;
        tracing::debug!(
            path = %path.display(),
            %scheme,
            key_id = %verifier.key_id,
            "loaded public key"
        );
        Ok(verifier)
    }

    /// Parse key material (PEM or securesystemslib JSON) under the given scheme.
    pub fn from_key_material(text: &str, scheme: Scheme) -> Result<Self, AttestationError> {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') {
            let key: SslibKey = serde_json::from_str(trimmed).map_err(|e| {
                AttestationError::Key(format!("malformed securesystemslib key: {e}"))
            })?;
            return Self::from_sslib(key, scheme);
        }
        Self::from_pem(trimmed, scheme)
    }

    fn from_sslib(key: SslibKey, scheme: Scheme) -> Result<Self, AttestationError> {
        if !scheme.accepts_keytype(&key.keytype) {
            return Err(AttestationError::Key(format!(
                "key type `{}` does not match declared scheme `{scheme}`",
                key.keytype
            )));
        }

        let mut verifier = if scheme == Scheme::Ed25519 {
            let raw = hex::decode(key.keyval.public.trim())
                .map_err(|e| AttestationError::Key(format!("invalid hex ed25519 key: {e}")))?;
            Self::from_raw_ed25519(raw)?
        } else {
            Self::from_pem(&key.keyval.public, scheme)?
        };

        if let Some(keyid) = key.keyid.filter(|id| !id.is_empty()) {
            verifier.key_id = keyid;
            verifier.declared_key_id = true;
        }
        Ok(verifier)
    }

    fn from_pem(pem: &str, scheme: Scheme) -> Result<Self, AttestationError> {
        let (label, der) = parse_pem(pem)
            .ok_or_else(|| AttestationError::Key("invalid PEM public key".to_owned()))?;
        match label.as_str() {
            "PUBLIC KEY" => Self::from_spki_der(&der, scheme),
            "RSA PUBLIC KEY" if scheme == Scheme::RsaPss => {
                let algorithm = &RSA_PSS_2048_8192_SHA256;
                Ok(Self::new(scheme, algorithm, der.clone(), &der))
            }
            other => Err(AttestationError::Key(format!(
                "expected a PUBLIC KEY PEM block, found `{other}`"
            ))),
        }
    }

    /// Build a verifier from DER-encoded `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8], scheme: Scheme) -> Result<Self, AttestationError> {
        let spki = SubjectPublicKeyInfoOwned::from_der(der)
            .map_err(|e| AttestationError::Key(format!("malformed SubjectPublicKeyInfo: {e}")))?;
        let oid = spki.algorithm.oid;
        let key_bytes = spki.subject_public_key.raw_bytes().to_vec();

        let algorithm: &'static dyn VerificationAlgorithm = match scheme {
            Scheme::Ed25519 if oid == ID_ED25519 => &ED25519,
            Scheme::RsaPss if oid == RSA_ENCRYPTION => &RSA_PSS_2048_8192_SHA256,
            Scheme::Ecdsa if oid == ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| {
                        AttestationError::Key("EC key without curve parameters".to_owned())
                    })?
                    .decode_as::<ObjectIdentifier>()
                    .map_err(|e| {
                        AttestationError::Key(format!("invalid EC curve parameters: {e}"))
                    })?;
                if curve == SECP256R1 {
                    &ECDSA_P256_SHA256_ASN1
                } else if curve == SECP384R1 {
                    &ECDSA_P384_SHA384_ASN1
                } else {
                    return Err(AttestationError::Key(format!("unsupported EC curve {curve}")));
                }
            }
            _ => {
                return Err(AttestationError::Key(format!(
                    "key algorithm {oid} does not match declared scheme `{scheme}`"
                )));
            }
        };

        Ok(Self::new(scheme, algorithm, key_bytes, der))
    }

    fn from_raw_ed25519(raw: Vec<u8>) -> Result<Self, AttestationError> {
        if raw.len() != ED25519_PUBLIC_KEY_LEN {
            return Err(AttestationError::Key(format!(
                "ed25519 public key must be {ED25519_PUBLIC_KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let spki = encode_ed25519_spki(&raw);
        Ok(Self::new(Scheme::Ed25519, &ED25519, raw, &spki))
    }

    fn new(
        scheme: Scheme,
        algorithm: &'static dyn VerificationAlgorithm,
        public_key: Vec<u8>,
        fingerprint_der: &[u8],
    ) -> Self {
        Self {
            scheme,
            algorithm,
            public_key,
            key_id: hex::encode(Sha256::digest(fingerprint_der)),
            declared_key_id: false,
        }
    }

    /// The scheme this key verifies under.
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Key identifier: the declared securesystemslib key id, or the
    /// SHA-256 of the encoded public key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Whether a signature labelled with `keyid` may have come from this key.
    ///
    /// Only a key id declared in the key file is used to rule signatures out.
    pub fn accepts_keyid(&self, keyid: &str) -> bool {
        !self.declared_key_id || keyid.is_empty() || keyid == self.key_id
    }

    /// Whether `signature` is a valid signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        UnparsedPublicKey::new(self.algorithm, &self.public_key)
            .verify(message, signature)
            .is_ok()
    }
}

const ED25519_PUBLIC_KEY_LEN: usize = 32;

// ── PEM helpers ─────────────────────────────────────────────────

/// Wrap DER bytes in PEM with the given label.
#[cfg(any(test, feature = "test-support"))]
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let lines: Vec<&str> = b64
        .as_bytes()
        .chunks(64)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    format!(
        "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
        lines.join("\n")
    )
}

/// Extract the label and DER bytes of the first PEM block in `pem`.
fn parse_pem(pem: &str) -> Option<(String, Vec<u8>)> {
    let mut b64 = String::new();
    let mut label = None;

    for line in pem.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("-----BEGIN ") {
            label = Some(rest.trim_end_matches('-').to_owned());
            continue;
        }
        if trimmed.starts_with("-----END ") {
            break;
        }
        if label.is_some() {
            b64.push_str(trimmed);
        }
    }

    let der = base64::engine::general_purpose::STANDARD.decode(&b64).ok()?;
    Some((label?, der))
}

/// Encode a raw Ed25519 public key (32 bytes) as SPKI DER.
///
/// ```text
/// SEQUENCE {
///   SEQUENCE { OID 1.3.101.112 (id-Ed25519) }
///   BIT STRING <public key>
/// }
/// ```
pub fn encode_ed25519_spki(pub_key: &[u8]) -> Vec<u8> {
    #[rustfmt::skip]
    const SPKI_HEADER: [u8; 12] = [
        0x30, 0x2a,                   // SEQUENCE (42 bytes total)
        0x30, 0x05,                   // SEQUENCE (5 bytes)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112
        0x03, 0x21, 0x00,             // BIT STRING (33 bytes, 0 unused bits)
    ];

    let mut spki = Vec::with_capacity(SPKI_HEADER.len() + pub_key.len());
    spki.extend_from_slice(&SPKI_HEADER);
    spki.extend_from_slice(pub_key);
    spki
}
