//! DSSE envelope parsing and pre-authentication encoding.
//!
//! See: <https://github.com/secure-systems-lab/dsse/blob/master/envelope.md>

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::AttestationError;
use crate::statement::Statement;

/// Payload type of an envelope carrying an in-toto statement.
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// A signed DSSE envelope as stored in an attestation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Media type of the decoded payload.
    #[serde(rename = "payloadType")]
    pub payload_type: String,
    /// Base64-encoded payload bytes.
    pub payload: String,
    /// Signatures over the pre-authentication encoding of the payload.
    #[serde(default)]
    pub signatures: Vec<EnvelopeSignature>,
}

/// One signature in a DSSE envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    /// Optional hint naming the key that produced the signature.
    #[serde(default)]
    pub keyid: String,
    /// Base64-encoded signature bytes.
    pub sig: String,
}

impl Envelope {
    /// Read and parse an envelope from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, AttestationError> {
        let data = std::fs::read_to_string(path).map_err(|e| AttestationError::io(path, e))?;
        Self::from_json(&data).map_err(|e| match e {
            AttestationError::Decode(reason) => {
                AttestationError::Decode(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Parse an envelope from its JSON encoding.
    pub fn from_json(json: &str) -> Result<Self, AttestationError> {
        serde_json::from_str(json)
            .map_err(|e| AttestationError::Decode(format!("malformed envelope: {e}")))
    }

    /// Decode the base64 payload.
    pub fn decode_payload(&self) -> Result<Vec<u8>, AttestationError> {
        decode_base64(&self.payload)
            .map_err(|e| AttestationError::Decode(format!("invalid base64 payload: {e}")))
    }

    /// Decode the payload as an in-toto statement.
    ///
    /// The predicate is left as an untyped JSON value.
    pub fn decode_statement(&self) -> Result<Statement, AttestationError> {
        let payload = self.decode_payload()?;
        Statement::from_slice(&payload)
    }

    /// The bytes that signatures in this envelope are computed over.
    pub fn pae_bytes(&self) -> Result<Vec<u8>, AttestationError> {
        Ok(pae(&self.payload_type, &self.decode_payload()?))
    }
}

impl EnvelopeSignature {
    /// Decode the base64 signature bytes.
    pub fn decode_sig(&self) -> Result<Vec<u8>, AttestationError> {
        decode_base64(&self.sig)
            .map_err(|e| AttestationError::Decode(format!("invalid base64 signature: {e}")))
    }
}

/// DSSE v1 pre-authentication encoding.
///
/// `PAE(type, body) = "DSSEv1" SP LEN(type) SP type SP LEN(body) SP body`
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decode standard or URL-safe base64, padded or not.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = data.trim().trim_end_matches('=');
    if trimmed.contains(['-', '_']) {
        URL_SAFE_NO_PAD.decode(trimmed)
    } else {
        STANDARD_NO_PAD.decode(trimmed)
    }
}
