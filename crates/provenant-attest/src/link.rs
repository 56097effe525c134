//! in-toto link predicate, v0.3.
//!
//! See: <https://github.com/in-toto/attestation/blob/main/spec/predicates/link.md>

use serde::{Deserialize, Serialize};

use crate::error::AttestationError;
use crate::statement::ResourceDescriptor;

/// The link predicate recorded for one supply-chain step.
///
/// Products are not part of the predicate; they are the statement's subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkPredicate {
    /// Name of the step.
    #[serde(default)]
    pub name: String,
    /// Command that was run.
    #[serde(default)]
    pub command: Vec<String>,
    /// Artifacts consumed by the step.
    #[serde(default)]
    pub materials: Vec<ResourceDescriptor>,
    /// Other information about the step (stdout, return value, ...).
    #[serde(default)]
    pub byproducts: serde_json::Value,
    /// Environment the step ran in.
    #[serde(default)]
    pub environment: serde_json::Value,
}

impl LinkPredicate {
    /// The link v0.3 predicate type URI.
    pub const PREDICATE_TYPE: &str = "https://in-toto.io/attestation/link/v0.3";

    /// Decode a link predicate from a statement's untyped predicate.
    pub fn from_value(predicate: &serde_json::Value) -> Result<Self, AttestationError> {
        Self::deserialize(predicate)
            .map_err(|e| AttestationError::Decode(format!("malformed link predicate: {e}")))
    }
}
