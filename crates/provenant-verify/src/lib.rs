//! Policy verification for in-toto attestations.
//!
//! `provenant-verify` checks a directory of signed attestations against a
//! policy document and accepts only if every attestation rule holds.
//!
//! Each rule runs in four steps:
//! 1. **Discovery** finds the attestation file named after the rule
//! 2. **Authorization** checks the envelope against the allowed functionaries' keys
//! 3. **Artifact rules** consume the statement's resource descriptors
//! 4. **Predicate attributes** evaluate CEL expressions over the statement
//!
//! Artifact snapshots and expression bindings carry over from earlier
//! rules to later ones within a single run.

pub mod authorize;
pub mod document;
pub mod error;
pub mod expression;
pub mod functionary;
pub mod policy;
pub mod rules;
pub mod verify;

#[cfg(test)]
mod testutil;

// Re-export primary types for convenience.
pub use document::PolicyDocument;
pub use error::VerificationError;
pub use verify::{RuleOutcome, VerificationReport, Verifier, VerifyConfig};
