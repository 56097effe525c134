//! in-toto v1 attestation statement.
//!
//! See: <https://github.com/in-toto/attestation/blob/main/spec/v1/statement.md>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AttestationError;

/// An in-toto v1 attestation statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Statement type URI, normally [`Statement::TYPE`].
    #[serde(rename = "_type", default)]
    pub statement_type: String,
    /// Artifacts the statement is about.
    #[serde(default)]
    pub subject: Vec<ResourceDescriptor>,
    /// URI identifying the shape of `predicate`.
    #[serde(rename = "predicateType", alias = "predicate_type", default)]
    pub predicate_type: String,
    /// The predicate, kept untyped until a rule needs a concrete shape.
    #[serde(default)]
    pub predicate: serde_json::Value,
}

impl Statement {
    /// The canonical statement type URI.
    pub const TYPE: &str = "https://in-toto.io/Statement/v1";

    /// Parse a statement from its JSON encoding.
    pub fn from_slice(data: &[u8]) -> Result<Self, AttestationError> {
        serde_json::from_slice(data)
            .map_err(|e| AttestationError::Decode(format!("malformed statement: {e}")))
    }
}

/// A reference to one artifact, with its identifying digests.
///
/// See: <https://github.com/in-toto/attestation/blob/main/spec/v1/resource_descriptor.md>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Artifact name, usually a path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Artifact URI.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Digest algorithm to hex digest.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digest: BTreeMap<String, String>,
    /// Inline artifact content (base64 on the wire).
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<u8>,
    /// Where the artifact can be downloaded from.
    #[serde(
        default,
        alias = "download_location",
        skip_serializing_if = "String::is_empty"
    )]
    pub download_location: String,
    /// Media type of the artifact.
    #[serde(default, alias = "media_type", skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    /// Free-form metadata; not part of the artifact's identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

impl ResourceDescriptor {
    /// Whether two descriptors identify the same artifact.
    ///
    /// Annotations are metadata and are not compared.
    pub fn same_artifact(&self, other: &Self) -> bool {
        self.name == other.name
            && self.uri == other.uri
            && self.digest == other.digest
            && self.content == other.content
            && self.download_location == other.download_location
            && self.media_type == other.media_type
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        crate::envelope::decode_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
