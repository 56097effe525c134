//! Policy dispatch.
//!
//! Each policy in an attestation rule names its kind by URI. The kind
//! decides how the untyped definition is decoded and evaluated.

use std::fmt;

use provenant_attest::Statement;
use serde::{Deserialize, Serialize};

use crate::document::Policy;
use crate::error::VerificationError;
use crate::expression::{ExpressionBindings, ExpressionEvaluator};
use crate::rules::{self, ArtifactRulesDefinition, ArtifactSnapshots};

/// Supported policy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PolicyKind {
    /// Artifact rules over one field of the statement.
    ArtifactRules,
    /// Boolean CEL expressions over the statement.
    PredicateAttribute,
}

impl PolicyKind {
    /// URI of the artifact-rules policy.
    pub const ARTIFACT_RULES_URI: &str = "https://in-toto.io/policy/artifact-rules/v0.1";
    /// URI of the predicate-attribute policy.
    pub const PREDICATE_ATTRIBUTE_URI: &str =
        "https://in-toto.io/policy/predicate-attribute/v0.1";

    /// The kind identified by `uri`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::ARTIFACT_RULES_URI => Some(Self::ArtifactRules),
            Self::PREDICATE_ATTRIBUTE_URI => Some(Self::PredicateAttribute),
            _ => None,
        }
    }

    /// The URI identifying this kind.
    pub const fn uri(self) -> &'static str {
        match self {
            Self::ArtifactRules => Self::ARTIFACT_RULES_URI,
            Self::PredicateAttribute => Self::PREDICATE_ATTRIBUTE_URI,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Definition of a predicate-attribute policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateAttributeDefinition {
    /// Expressions that must all evaluate to `true`.
    pub expressions: Vec<String>,
}

/// State carried across the rules of one verification run.
///
/// Created empty for every run, so nothing leaks between runs.
#[derive(Debug, Default)]
pub struct VerificationState {
    /// Working sets recorded by artifact-rule policies.
    pub snapshots: ArtifactSnapshots,
    /// Statements accepted by predicate-attribute policies.
    pub bindings: ExpressionBindings,
}

impl VerificationState {
    /// Fresh state for a new run.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply one policy to an authorized statement.
pub fn apply_policy(
    statement: &Statement,
    policy: &Policy,
    rule_name: &str,
    state: &mut VerificationState,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<PolicyKind, VerificationError> {
    let kind = PolicyKind::from_uri(&policy.policy_type)
        .ok_or_else(|| VerificationError::UnsupportedPolicyType(policy.policy_type.clone()))?;

    match kind {
        PolicyKind::ArtifactRules => {
            let definition: ArtifactRulesDefinition = decode_definition(policy)?;
            rules::evaluate(statement, &definition, rule_name, &mut state.snapshots)?;
        }
        PolicyKind::PredicateAttribute => {
            let definition: PredicateAttributeDefinition = decode_definition(policy)?;
            let current = serde_json::to_value(statement).map_err(|e| {
                VerificationError::ExpressionEvaluation {
                    expression: String::new(),
                    reason: format!("failed to encode statement: {e}"),
                }
            })?;
            for expression in &definition.expressions {
                if !evaluator.evaluate(expression, &current, &state.bindings)? {
                    return Err(VerificationError::ExpressionFalse(expression.clone()));
                }
                tracing::debug!(rule = rule_name, expression = %expression, "expression holds");
            }
            state.bindings.register(rule_name, current);
        }
    }
    Ok(kind)
}

fn decode_definition<T: serde::de::DeserializeOwned>(
    policy: &Policy,
) -> Result<T, VerificationError> {
    T::deserialize(&policy.definition).map_err(|e| VerificationError::InvalidPolicyDefinition {
        policy_type: policy.policy_type.clone(),
        reason: e.to_string(),
    })
}
