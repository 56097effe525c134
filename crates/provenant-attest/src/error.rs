//! Error types for the attestation data model.

/// Errors from reading envelopes, decoding statements, and parsing keys.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    /// Failed to read an attestation or key file.
    #[error("failed to read `{path}`")]
    Io {
        /// The file that could not be read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An envelope, statement, or predicate could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The declared signature scheme is not one of the supported schemes.
    #[error("unsupported signature scheme `{0}` (expected rsa-pss, ecdsa, or ed25519)")]
    UnsupportedScheme(String),

    /// Public key material is malformed or does not match its declared scheme.
    #[error("key error: {0}")]
    Key(String),
}

impl AttestationError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
