//! Top-level verification orchestrator.
//!
//! The `Verifier` loads functionary keys, finds one attestation per
//! attestation rule, authorizes it, and applies the rule's policies in
//! document order. The first failure aborts the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use provenant_attest::Envelope;
use serde::Serialize;

use crate::authorize::authorize;
use crate::document::{AttestationRule, PolicyDocument};
use crate::error::VerificationError;
use crate::expression::{CelEvaluator, ExpressionEvaluator};
use crate::functionary::FunctionaryRegistry;
use crate::policy::{PolicyKind, VerificationState, apply_policy};

/// Configuration for a verification run.
#[derive(Debug, Clone, Default)]
pub struct VerifyConfig {
    /// Directory key paths are resolved against. Defaults to the current
    /// directory.
    pub functionary_dir: Option<PathBuf>,
    /// Directory searched for attestation files. Defaults to the current
    /// directory.
    pub attestation_dir: Option<PathBuf>,
}

/// The outcome of one attestation rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    /// The attestation rule name.
    pub rule: String,
    /// The attestation file that satisfied it.
    pub attestation: PathBuf,
    /// The policies applied, in order.
    pub policies: Vec<PolicyKind>,
}

/// The result of a successful verification run.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// One entry per attestation rule, in document order.
    pub rules: Vec<RuleOutcome>,
}

/// Orchestrates verification of a policy document.
pub struct Verifier {
    config: VerifyConfig,
    evaluator: Box<dyn ExpressionEvaluator>,
}

impl Verifier {
    /// Create a verifier that evaluates expressions with CEL.
    pub fn new(config: VerifyConfig) -> Self {
        Self::with_evaluator(config, Box::new(CelEvaluator))
    }

    /// Create a verifier with a custom expression evaluator.
    pub fn with_evaluator(
        config: VerifyConfig,
        evaluator: Box<dyn ExpressionEvaluator>,
    ) -> Self {
        Self { config, evaluator }
    }

    /// Verify every attestation rule of `document`.
    pub fn verify(
        &self,
        document: &PolicyDocument,
    ) -> Result<VerificationReport, VerificationError> {
        tracing::info!(
            rules = document.attestation_rules.len(),
            "starting policy verification"
        );

        let functionary_dir = resolve_dir(self.config.functionary_dir.as_deref())?;
        let registry = FunctionaryRegistry::load(&document.functionaries, &functionary_dir)?;

        let attestation_dir = resolve_dir(self.config.attestation_dir.as_deref())?;
        let attestations = discover_attestations(&attestation_dir)?;

        let mut state = VerificationState::new();
        let mut rules = Vec::with_capacity(document.attestation_rules.len());
        for rule in &document.attestation_rules {
            let outcome = self
                .verify_rule(rule, &attestations, &attestation_dir, &registry, &mut state)
                .map_err(|e| e.in_attestation_rule(&rule.name))?;
            rules.push(outcome);
        }

        tracing::info!(rules = rules.len(), "policy verification passed");
        Ok(VerificationReport { rules })
    }

    fn verify_rule(
        &self,
        rule: &AttestationRule,
        attestations: &HashMap<String, PathBuf>,
        attestation_dir: &Path,
        registry: &FunctionaryRegistry,
        state: &mut VerificationState,
    ) -> Result<RuleOutcome, VerificationError> {
        let path = attestations
            .get(&rule.name)
            .ok_or_else(|| VerificationError::AttestationNotFound {
                rule: rule.name.clone(),
                dir: attestation_dir.display().to_string(),
            })?;
        tracing::info!(rule = %rule.name, path = %path.display(), "verifying attestation rule");

        let envelope = Envelope::from_file(path)?;
        let statement = authorize(
            &envelope,
            &rule.allowed_functionaries,
            registry,
            &rule.predicate_type,
        )?;

        let mut policies = Vec::with_capacity(rule.policies.len());
        for policy in &rule.policies {
            tracing::debug!(
                rule = %rule.name,
                policy_type = %policy.policy_type,
                "applying policy"
            );
            let evaluator = self.evaluator.as_ref();
            let kind = apply_policy(&statement, policy, &rule.name, state, evaluator)
                .map_err(|e| e.in_policy(&policy.policy_type))?;
            policies.push(kind);
        }

        tracing::info!(
            rule = %rule.name,
            policies = policies.len(),
            "attestation rule verified"
        );
        Ok(RuleOutcome {
            rule: rule.name.clone(),
            attestation: path.clone(),
            policies,
        })
    }
}

/// The configured directory, or the current directory when unset.
fn resolve_dir(dir: Option<&Path>) -> Result<PathBuf, VerificationError> {
    let Some(dir) = dir else {
        return std::env::current_dir().map_err(|source| VerificationError::Io {
            path: ".".to_owned(),
            source,
        });
    };
    let metadata = std::fs::metadata(dir).map_err(|source| VerificationError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(VerificationError::NotADirectory(dir.display().to_string()));
    }
    Ok(dir.to_path_buf())
}

/// Map attestation rule names to attestation files in `dir`.
///
/// Files ending in `.json` or `.link` are keyed by the part of their name
/// before the first dot. Entries are visited in name order and the first
/// file for a key wins.
pub fn discover_attestations(dir: &Path) -> Result<HashMap<String, PathBuf>, VerificationError> {
    let io_err = |source| VerificationError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let mut attestations: HashMap<String, PathBuf> = HashMap::new();
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !(name.ends_with(".json") || name.ends_with(".link")) {
            continue;
        }
        let key = name.split('.').next().unwrap_or_default().to_owned();
        if let Some(existing) = attestations.get(&key) {
            tracing::warn!(
                rule = %key,
                used = %existing.display(),
                ignored = %path.display(),
                "multiple attestation files for rule"
            );
            continue;
        }
        attestations.insert(key, path);
    }
    tracing::debug!(dir = %dir.display(), count = attestations.len(), "discovered attestations");
    Ok(attestations)
}
