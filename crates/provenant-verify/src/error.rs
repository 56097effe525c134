//! Error types for the verification subsystem.

use provenant_attest::AttestationError;

/// Errors from Provenant policy verification.
///
/// Every error is fatal to the run. Errors raised deep inside a rule are
/// wrapped in context variants ([`Self::ArtifactRule`], [`Self::Policy`],
/// [`Self::AttestationRule`]) on the way out; [`Self::root_cause`] peels
/// those layers off again.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The policy document could not be loaded.
    #[error("invalid policy document `{path}`: {reason}")]
    Config {
        /// Path of the policy document.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A functionary declared a scheme that is not supported.
    #[error("functionary `{functionary}` uses unsupported scheme `{scheme}`")]
    UnsupportedScheme {
        /// The functionary name.
        functionary: String,
        /// The declared scheme.
        scheme: String,
    },

    /// A functionary's public key could not be loaded.
    #[error("failed to load key for functionary `{functionary}`")]
    KeyLoad {
        /// The functionary name.
        functionary: String,
        /// The underlying key error.
        source: AttestationError,
    },

    /// An attestation could not be read or decoded.
    #[error(transparent)]
    Attestation(#[from] AttestationError),

    /// A directory could not be read.
    #[error("failed to read directory `{path}`")]
    Io {
        /// The directory.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A configured directory path is not a directory.
    #[error("`{0}` is not a directory")]
    NotADirectory(String),

    /// No attestation file exists for an attestation rule.
    #[error("no attestation file found for rule `{rule}` in `{dir}`")]
    AttestationNotFound {
        /// The attestation rule name.
        rule: String,
        /// The directory that was searched.
        dir: String,
    },

    /// The envelope does not carry an in-toto statement.
    #[error("envelope payload type is `{actual}`, expected `{expected}`")]
    WrongPayloadType {
        /// The required payload type.
        expected: &'static str,
        /// The payload type found in the envelope.
        actual: String,
    },

    /// An allowed functionary has no loaded key.
    #[error("allowed functionary `{0}` is not declared in the policy document")]
    UnknownFunctionary(String),

    /// No envelope signature verified under any allowed functionary.
    #[error(
        "no valid signature from allowed functionaries {allowed:?} ({signatures} signature(s) checked)"
    )]
    SignatureVerificationFailed {
        /// The functionaries whose keys were tried.
        allowed: Vec<String>,
        /// Number of signatures in the envelope.
        signatures: usize,
    },

    /// The statement's predicate type differs from the rule's.
    #[error("predicate type is `{actual}`, expected `{expected}`")]
    PredicateTypeMismatch {
        /// The predicate type declared by the attestation rule.
        expected: String,
        /// The predicate type of the statement.
        actual: String,
    },

    /// The policy type URI is not recognized.
    #[error("unsupported policy type `{0}`")]
    UnsupportedPolicyType(String),

    /// A policy definition does not have the shape its type requires.
    #[error("invalid definition for policy `{policy_type}`: {reason}")]
    InvalidPolicyDefinition {
        /// The policy type URI.
        policy_type: String,
        /// What went wrong.
        reason: String,
    },

    /// A field path descends into a predicate type with no known shape.
    #[error("unsupported predicate type `{0}`")]
    UnsupportedPredicateType(String),

    /// An artifact rule could not be parsed.
    #[error("malformed artifact rule `{rule}`: {reason}")]
    Parse {
        /// The rule source text.
        rule: String,
        /// What went wrong.
        reason: String,
    },

    /// A field path names an attribute that does not exist.
    #[error("statement field does not exist: `{0}`")]
    FieldNotFound(String),

    /// A field path names an attribute that is not a list of resource descriptors.
    #[error("statement field is not a collection of resource descriptors: `{0}`")]
    FieldNotACollection(String),

    /// A wildcard pattern did not compile.
    #[error("invalid pattern `{pattern}`")]
    InvalidGlob {
        /// The pattern as written in the rule.
        pattern: String,
        /// The regex compilation error.
        source: regex::Error,
    },

    /// A literal `REQUIRE` named an artifact that is not present.
    #[error("required artifact `{pattern}` not found")]
    RequirementNotMet {
        /// The required artifact name.
        pattern: String,
    },

    /// A `DISALLOW` pattern matched an artifact.
    #[error("artifact `{artifact}` matches disallowed pattern `{pattern}`")]
    DisallowedArtifactPresent {
        /// The disallow pattern.
        pattern: String,
        /// The first matching artifact.
        artifact: String,
    },

    /// Artifacts were left unconsumed by a rule set that rejects leftovers.
    #[error("artifacts not consumed by any rule: {0:?}")]
    UnconsumedArtifacts(Vec<String>),

    /// A predicate-attribute expression did not compile.
    #[error("invalid expression `{expression}`: {reason}")]
    InvalidExpression {
        /// The expression source.
        expression: String,
        /// The compiler's message.
        reason: String,
    },

    /// A predicate-attribute expression failed during evaluation.
    #[error("failed to evaluate expression `{expression}`: {reason}")]
    ExpressionEvaluation {
        /// The expression source.
        expression: String,
        /// The runtime's message.
        reason: String,
    },

    /// A predicate-attribute expression does not produce a boolean.
    #[error("expression `{expression}` must resolve to a boolean, got {actual}")]
    ExpressionType {
        /// The expression source.
        expression: String,
        /// Description of the value produced.
        actual: String,
    },

    /// A predicate-attribute expression evaluated to false.
    #[error("predicate attribute expression is false: `{0}`")]
    ExpressionFalse(String),

    /// Context: an artifact rule inside a rule set failed.
    #[error("artifact rule `{rule}` on field `{field}` failed")]
    ArtifactRule {
        /// The field the rule set evaluates.
        field: String,
        /// The rule source text.
        rule: String,
        /// The underlying failure.
        #[source]
        source: Box<VerificationError>,
    },

    /// Context: a policy failed.
    #[error("policy `{policy_type}` failed")]
    Policy {
        /// The policy type URI.
        policy_type: String,
        /// The underlying failure.
        #[source]
        source: Box<VerificationError>,
    },

    /// Context: an attestation rule failed.
    #[error("attestation rule `{rule}` failed")]
    AttestationRule {
        /// The attestation rule name.
        rule: String,
        /// The underlying failure.
        #[source]
        source: Box<VerificationError>,
    },
}

impl VerificationError {
    /// The innermost error, with all context layers removed.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::ArtifactRule { source, .. }
            | Self::Policy { source, .. }
            | Self::AttestationRule { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The attestation rule the error occurred in, if any.
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            Self::AttestationRule { rule, .. } => Some(rule),
            _ => None,
        }
    }

    /// The policy type the error occurred in, if any.
    pub fn policy_type(&self) -> Option<&str> {
        match self {
            Self::AttestationRule { source, .. } => source.policy_type(),
            Self::Policy { policy_type, .. } => Some(policy_type),
            _ => None,
        }
    }

    /// Render the error and every cause as one line.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut current: Option<&dyn std::error::Error> = std::error::Error::source(self);
        while let Some(cause) = current {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            current = cause.source();
        }
        message
    }

    pub(crate) fn in_attestation_rule(self, rule: &str) -> Self {
        Self::AttestationRule {
            rule: rule.to_owned(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_policy(self, policy_type: &str) -> Self {
        Self::Policy {
            policy_type: policy_type.to_owned(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_artifact_rule(self, field: &str, rule: &str) -> Self {
        Self::ArtifactRule {
            field: field.to_owned(),
            rule: rule.to_owned(),
            source: Box::new(self),
        }
    }
}
