//! Signing fixtures shared by the unit tests.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{Ed25519KeyPair, KeyPair};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use provenant_attest::envelope::{IN_TOTO_PAYLOAD_TYPE, pae};
use provenant_attest::keys::{der_to_pem, encode_ed25519_spki};
use provenant_attest::{Envelope, EnvelopeSignature, Statement};
use serde_json::{Value, json};

/// A throwaway Ed25519 signing identity.
pub(crate) struct TestSigner {
    key_pair: Ed25519KeyPair,
}

impl TestSigner {
    pub(crate) fn generate() -> Self {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
        Self {
            key_pair: Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap(),
        }
    }

    pub(crate) fn public_pem(&self) -> String {
        der_to_pem(
            &encode_ed25519_spki(self.key_pair.public_key().as_ref()),
            "PUBLIC KEY",
        )
    }

    /// securesystemslib JSON encoding of the public key with a declared key id.
    pub(crate) fn sslib_json(&self, keyid: &str) -> String {
        json!({
            "keytype": "ed25519",
            "scheme": "ed25519",
            "keyid": keyid,
            "keyval": { "public": hex::encode(self.key_pair.public_key().as_ref()) }
        })
        .to_string()
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key_pair.sign(message).as_ref().to_vec()
    }
}

/// Wrap a statement in an envelope signed by each of `signers`.
pub(crate) fn envelope(statement: &Value, signers: &[&TestSigner]) -> Envelope {
    envelope_with_type(IN_TOTO_PAYLOAD_TYPE, statement, signers)
}

pub(crate) fn envelope_with_type(
    payload_type: &str,
    statement: &Value,
    signers: &[&TestSigner],
) -> Envelope {
    let payload = serde_json::to_vec(statement).unwrap();
    let message = pae(payload_type, &payload);
    Envelope {
        payload_type: payload_type.to_owned(),
        payload: STANDARD.encode(&payload),
        signatures: signers
            .iter()
            .map(|signer| EnvelopeSignature {
                keyid: String::new(),
                sig: STANDARD.encode(signer.sign(&message)),
            })
            .collect(),
    }
}

/// A link v0.3 statement with the given products and materials.
pub(crate) fn link_statement(products: &[&str], materials: &[&str]) -> Value {
    let descriptors = |names: &[&str]| -> Vec<Value> {
        names
            .iter()
            .map(|name| {
                let digest = format!("{:0>64}", name.len());
                json!({ "name": name, "digest": { "sha256": digest } })
            })
            .collect()
    };
    json!({
        "_type": Statement::TYPE,
        "subject": descriptors(products),
        "predicateType": "https://in-toto.io/attestation/link/v0.3",
        "predicate": {
            "name": "build",
            "command": ["make"],
            "materials": descriptors(materials),
        }
    })
}

/// Decode a JSON statement value.
pub(crate) fn statement(value: &Value) -> Statement {
    serde_json::from_value(value.clone()).unwrap()
}
