//! Functionary key registry.
//!
//! Resolves every functionary in a policy document to a verifier once,
//! before any attestation is read.

use std::collections::HashMap;
use std::path::Path;

use provenant_attest::{AttestationError, KeyVerifier, Scheme};

use crate::document::Functionary;
use crate::error::VerificationError;

/// Loaded public keys, keyed by functionary name.
#[derive(Debug, Default)]
pub struct FunctionaryRegistry {
    keys: HashMap<String, KeyVerifier>,
}

impl FunctionaryRegistry {
    /// Load every functionary's key.
    ///
    /// `publicKeyPath` is resolved against `key_dir`; inline `publicKey`
    /// material is used when no path is given.
    pub fn load(functionaries: &[Functionary], key_dir: &Path) -> Result<Self, VerificationError> {
        let mut keys = HashMap::with_capacity(functionaries.len());
        for functionary in functionaries {
            let scheme: Scheme =
                functionary
                    .scheme
                    .parse()
                    .map_err(|_| VerificationError::UnsupportedScheme {
                        functionary: functionary.name.clone(),
                        scheme: functionary.scheme.clone(),
                    })?;

            let key_load = |source: AttestationError| VerificationError::KeyLoad {
                functionary: functionary.name.clone(),
                source,
            };
            let verifier = match (&functionary.public_key_path, &functionary.public_key) {
                (Some(path), _) => KeyVerifier::from_file(&key_dir.join(path), scheme),
                (None, Some(material)) => KeyVerifier::from_key_material(material, scheme),
                (None, None) => Err(AttestationError::Key("no public key configured".to_owned())),
            }
            .map_err(key_load)?;

            tracing::info!(
                functionary = %functionary.name,
                scheme = %scheme,
                key_id = %verifier.key_id(),
                "loaded functionary key"
            );
            keys.insert(functionary.name.clone(), verifier);
        }
        Ok(Self { keys })
    }

    /// The verifier for a functionary, if one was declared.
    pub fn get(&self, name: &str) -> Option<&KeyVerifier> {
        self.keys.get(name)
    }

    /// Number of loaded functionaries.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no functionaries were loaded.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
