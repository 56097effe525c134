//! Envelope authorization.
//!
//! An envelope is authorized when it carries an in-toto statement, at least
//! one of its signatures verifies under an allowed functionary's key, and
//! the statement has the predicate type the rule expects.

use provenant_attest::envelope::IN_TOTO_PAYLOAD_TYPE;
use provenant_attest::{Envelope, KeyVerifier, Statement};

use crate::error::VerificationError;
use crate::functionary::FunctionaryRegistry;

/// Authorize an envelope and return the statement it carries.
pub fn authorize(
    envelope: &Envelope,
    allowed: &[String],
    registry: &FunctionaryRegistry,
    expected_predicate_type: &str,
) -> Result<Statement, VerificationError> {
    if envelope.payload_type != IN_TOTO_PAYLOAD_TYPE {
        return Err(VerificationError::WrongPayloadType {
            expected: IN_TOTO_PAYLOAD_TYPE,
            actual: envelope.payload_type.clone(),
        });
    }

    let verifiers = allowed
        .iter()
        .map(|name| {
            registry
                .get(name)
                .map(|verifier| (name.as_str(), verifier))
                .ok_or_else(|| VerificationError::UnknownFunctionary(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let message = envelope.pae_bytes()?;
    let Some(signer) = first_valid_signer(envelope, &message, &verifiers) else {
        return Err(VerificationError::SignatureVerificationFailed {
            allowed: allowed.to_vec(),
            signatures: envelope.signatures.len(),
        });
    };
    tracing::debug!(functionary = signer, "envelope signature verified");

    let statement = envelope.decode_statement()?;
    if statement.predicate_type != expected_predicate_type {
        return Err(VerificationError::PredicateTypeMismatch {
            expected: expected_predicate_type.to_owned(),
            actual: statement.predicate_type,
        });
    }
    Ok(statement)
}

/// The first allowed functionary with a valid signature over `message`.
///
/// Signatures that fail to decode or whose key id names a different key
/// are skipped.
fn first_valid_signer<'a>(
    envelope: &Envelope,
    message: &[u8],
    verifiers: &[(&'a str, &KeyVerifier)],
) -> Option<&'a str> {
    for signature in &envelope.signatures {
        let Ok(sig) = signature.decode_sig() else {
            tracing::debug!(keyid = %signature.keyid, "skipping undecodable signature");
            continue;
        };
        for (name, verifier) in verifiers {
            if verifier.accepts_keyid(&signature.keyid) && verifier.verify(message, &sig) {
                return Some(name);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Functionary;
    use crate::testutil::{TestSigner, envelope, envelope_with_type, link_statement};

    const LINK: &str = "https://in-toto.io/attestation/link/v0.3";

    fn registry(signers: &[(&str, &TestSigner)]) -> FunctionaryRegistry {
        let functionaries: Vec<Functionary> = signers
            .iter()
            .map(|(name, signer)| Functionary {
                name: (*name).to_owned(),
                public_key_path: None,
                public_key: Some(signer.public_pem()),
                scheme: "ed25519".to_owned(),
            })
            .collect();
        FunctionaryRegistry::load(&functionaries, std::path::Path::new(".")).unwrap()
    }

    fn allowed(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn signed_by_allowed_functionary_passes() {
        let alice = TestSigner::generate();
        let env = envelope(&link_statement(&["out.bin"], &[]), &[&alice]);
        let reg = registry(&[("alice", &alice)]);
        let statement = authorize(&env, &allowed(&["alice"]), &reg, LINK).expect("authorized");
        assert_eq!(statement.subject[0].name, "out.bin");
    }

    #[test]
    fn any_allowed_signature_suffices() {
        let alice = TestSigner::generate();
        let bob = TestSigner::generate();
        let mallory = TestSigner::generate();
        let env = envelope(&link_statement(&[], &[]), &[&mallory, &bob]);
        let reg = registry(&[("alice", &alice), ("bob", &bob)]);
        authorize(&env, &allowed(&["alice", "bob"]), &reg, LINK)
            .expect("bob's signature verifies");
    }

    #[test]
    fn signature_from_other_functionary_fails() {
        let alice = TestSigner::generate();
        let bob = TestSigner::generate();
        let env = envelope(&link_statement(&[], &[]), &[&bob]);
        let reg = registry(&[("alice", &alice), ("bob", &bob)]);
        let err = authorize(&env, &allowed(&["alice"]), &reg, LINK).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::SignatureVerificationFailed { signatures: 1, .. }
        ));
    }

    #[test]
    fn unsigned_envelope_fails() {
        let alice = TestSigner::generate();
        let env = envelope(&link_statement(&[], &[]), &[]);
        let reg = registry(&[("alice", &alice)]);
        let err = authorize(&env, &allowed(&["alice"]), &reg, LINK).unwrap_err();
        assert!(matches!(err, VerificationError::SignatureVerificationFailed { .. }));
    }

    #[test]
    fn tampered_payload_fails() {
        let alice = TestSigner::generate();
        let mut env = envelope(&link_statement(&["out.bin"], &[]), &[&alice]);
        let other = envelope(&link_statement(&["evil.bin"], &[]), &[]);
        env.payload = other.payload;
        let reg = registry(&[("alice", &alice)]);
        let err = authorize(&env, &allowed(&["alice"]), &reg, LINK).unwrap_err();
        assert!(matches!(err, VerificationError::SignatureVerificationFailed { .. }));
    }

    #[test]
    fn wrong_payload_type_checked_first() {
        let alice = TestSigner::generate();
        let env = envelope_with_type("application/json", &link_statement(&[], &[]), &[&alice]);
        let err = authorize(&env, &allowed(&["nobody"]), &registry(&[]), LINK).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::WrongPayloadType { actual, .. } if actual == "application/json"
        ));
    }

    #[test]
    fn unknown_functionary_rejected() {
        let alice = TestSigner::generate();
        let env = envelope(&link_statement(&[], &[]), &[&alice]);
        let reg = registry(&[("alice", &alice)]);
        let err = authorize(&env, &allowed(&["alice", "ghost"]), &reg, LINK).unwrap_err();
        assert!(matches!(err, VerificationError::UnknownFunctionary(name) if name == "ghost"));
    }

    #[test]
    fn predicate_type_checked_after_signature() {
        let alice = TestSigner::generate();
        let env = envelope(&link_statement(&[], &[]), &[&alice]);
        let err = authorize(
            &env,
            &allowed(&["alice"]),
            &registry(&[("alice", &alice)]),
            "https://slsa.dev/provenance/v1",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::PredicateTypeMismatch { actual, .. } if actual == LINK
        ));
    }

    #[test]
    fn undecodable_signature_is_skipped() {
        let alice = TestSigner::generate();
        let mut env = envelope(&link_statement(&[], &[]), &[&alice]);
        env.signatures.insert(
            0,
            provenant_attest::EnvelopeSignature {
                keyid: String::new(),
                sig: "!!not base64!!".to_owned(),
            },
        );
        let reg = registry(&[("alice", &alice)]);
        authorize(&env, &allowed(&["alice"]), &reg, LINK).expect("second signature verifies");
    }

    #[test]
    fn declared_key_id_filters_signatures() {
        let alice = TestSigner::generate();
        let functionaries = [Functionary {
            name: "alice".to_owned(),
            public_key_path: None,
            public_key: Some(alice.sslib_json("alice-key")),
            scheme: "ed25519".to_owned(),
        }];
        let reg = FunctionaryRegistry::load(&functionaries, std::path::Path::new(".")).unwrap();

        let mut env = envelope(&link_statement(&[], &[]), &[&alice]);
        env.signatures[0].keyid = "someone-else".to_owned();
        let err = authorize(&env, &allowed(&["alice"]), &reg, LINK).unwrap_err();
        assert!(matches!(err, VerificationError::SignatureVerificationFailed { .. }));

        env.signatures[0].keyid = "alice-key".to_owned();
        authorize(&env, &allowed(&["alice"]), &reg, LINK).expect("matching key id verifies");
    }
}
