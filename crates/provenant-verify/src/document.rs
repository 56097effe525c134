//! Policy document model and loading.
//!
//! A policy document declares the trusted functionaries and, in order,
//! the attestation rules every attestation must satisfy. Documents are
//! written in YAML or JSON.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VerificationError;

/// A complete policy document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    /// Trusted identities and their public keys.
    #[serde(default)]
    pub functionaries: Vec<Functionary>,
    /// Rules evaluated in order, one attestation each.
    #[serde(default)]
    pub attestation_rules: Vec<AttestationRule>,
}

/// A named trusted identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Functionary {
    /// Unique functionary name, referenced by `allowedFunctionaries`.
    pub name: String,
    /// Key file path, relative to the functionary directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<String>,
    /// Inline key material (PEM or securesystemslib JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Signature scheme: `rsa-pss`, `ecdsa`, or `ed25519`.
    pub scheme: String,
}

/// Constraints on one attestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRule {
    /// Rule name; also the attestation file name prefix.
    pub name: String,
    /// Predicate type the attestation must carry.
    pub predicate_type: String,
    /// Policies applied in order.
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// Functionaries allowed to sign the attestation.
    #[serde(default)]
    pub allowed_functionaries: Vec<String>,
}

/// One policy: a type URI and its type-specific definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// URI identifying the policy kind.
    #[serde(rename = "type")]
    pub policy_type: String,
    /// Definition, decoded once the kind is known.
    #[serde(default)]
    pub definition: serde_json::Value,
}

impl PolicyDocument {
    /// Load a policy document, choosing the format from the file extension
    /// (`.yaml`, `.yml`, or `.json`).
    pub fn from_file(path: &Path) -> Result<Self, VerificationError> {
        let config_err = |reason: String| VerificationError::Config {
            path: path.display().to_string(),
            reason,
        };

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let data = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;

        let document: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&data).map_err(|e| config_err(e.to_string()))?,
            "json" => serde_json::from_str(&data).map_err(|e| config_err(e.to_string()))?,
            other => {
                return Err(config_err(format!(
                    "unsupported file extension `{other}` (expected .yaml, .yml, or .json)"
                )));
            }
        };

        document.validate().map_err(config_err)?;
        tracing::info!(
            path = %path.display(),
            functionaries = document.functionaries.len(),
            rules = document.attestation_rules.len(),
            "loaded policy document"
        );
        Ok(document)
    }

    /// Check document-level invariants.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for functionary in &self.functionaries {
            if !seen.insert(functionary.name.as_str()) {
                return Err(format!("duplicate functionary `{}`", functionary.name));
            }
            if functionary.public_key_path.is_none() && functionary.public_key.is_none() {
                return Err(format!(
                    "functionary `{}` has neither publicKeyPath nor publicKey",
                    functionary.name
                ));
            }
        }
        Ok(())
    }
}
