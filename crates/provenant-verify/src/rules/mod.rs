//! Artifact rules: a small language asserting which resource descriptors a
//! statement may carry.
//!
//! A rule set names a field of the statement (for example
//! `this.products` or `this.predicate.materials`) and a list of rules. The
//! field's descriptors form a [`WorkingSet`]; each rule consumes the
//! artifacts it accounts for or fails the set. Once every rule has run, the
//! set as it was *before* any rule consumed from it is recorded in the
//! run's [`ArtifactSnapshots`] so later rule sets can `MATCH` against it.

pub mod field;
pub mod parse;
pub mod pattern;
pub mod working_set;

use provenant_attest::Statement;
use serde::{Deserialize, Serialize};

pub use parse::{ArtifactRule, RelationalRule};
pub use pattern::Pattern;
pub use working_set::{ArtifactSnapshots, WorkingSet};

use crate::error::VerificationError;

/// Definition of an artifact-rules policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRulesDefinition {
    /// Field path naming the descriptors to check.
    pub field: String,
    /// Rules, applied in order.
    #[serde(default)]
    pub rules: Vec<String>,
    /// Fail when artifacts remain after every rule has run.
    #[serde(default)]
    pub reject_unconsumed: bool,
}

/// Snapshot key for `field` evaluated under `rule_name`.
///
/// `this.products` under rule `build` becomes `build.products`; a field
/// without the `this.` marker is prefixed with the rule name.
pub fn snapshot_key(rule_name: &str, field: &str) -> String {
    let path = field.strip_prefix("this.").unwrap_or(field);
    format!("{rule_name}.{path}")
}

/// Evaluate a rule set against `statement`, returning the artifacts left
/// unconsumed.
pub fn evaluate(
    statement: &Statement,
    definition: &ArtifactRulesDefinition,
    rule_name: &str,
    snapshots: &mut ArtifactSnapshots,
) -> Result<WorkingSet, VerificationError> {
    let artifacts = field::resolve_artifacts(statement, &definition.field)?;
    let original = WorkingSet::from_descriptors(artifacts);
    let mut working = original.clone();
    tracing::debug!(
        rule = rule_name,
        field = %definition.field,
        artifacts = working.len(),
        "evaluating artifact rules"
    );

    for source in &definition.rules {
        let context = |e: VerificationError| e.in_artifact_rule(&definition.field, source);
        let rule: ArtifactRule = source.parse().map_err(context)?;
        working.apply(&rule, snapshots).map_err(context)?;
    }

    if definition.reject_unconsumed && !working.is_empty() {
        return Err(VerificationError::UnconsumedArtifacts(
            working.names().map(str::to_owned).collect(),
        ));
    }
    if !working.is_empty() {
        tracing::debug!(
            rule = rule_name,
            remaining = ?working.names().collect::<Vec<_>>(),
            "artifacts left unconsumed"
        );
    }

    snapshots.record(snapshot_key(rule_name, &definition.field), original);
    Ok(working)
}
