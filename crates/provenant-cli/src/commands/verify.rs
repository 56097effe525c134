//! The `provenant verify` subcommand.
//!
//! Verifies a directory of attestations against a policy document.

use std::path::PathBuf;
use std::process;

use clap::Args;
use color_eyre::eyre::Result;
use provenant_verify::{PolicyDocument, VerificationError, Verifier, VerifyConfig};

/// Arguments for `provenant verify`.
#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the policy document (.yaml, .yml, or .json).
    pub policy: PathBuf,

    /// Directory functionary key paths are resolved against [default: current directory].
    #[arg(
        short = 'f',
        long,
        value_name = "DIR",
        visible_alias = "functionary-directory"
    )]
    pub functionary_dir: Option<PathBuf>,

    /// Directory searched for attestation files [default: current directory].
    #[arg(
        short = 'a',
        long,
        value_name = "DIR",
        visible_alias = "attestation-directory"
    )]
    pub attestation_dir: Option<PathBuf>,

    /// Output results as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the verify command.
pub fn execute(args: VerifyArgs) -> Result<()> {
    let document = PolicyDocument::from_file(&args.policy)?;

    let config = VerifyConfig {
        functionary_dir: args.functionary_dir,
        attestation_dir: args.attestation_dir,
    };

    match Verifier::new(config).verify(&document) {
        Ok(report) => {
            if args.json {
                let json_report = serde_json::json!({
                    "passed": true,
                    "rules": report.rules,
                });
                println!("{}", serde_json::to_string_pretty(&json_report)?);
            } else {
                for outcome in &report.rules {
                    println!(
                        "[PASS] {} ({}, {} polic{})",
                        outcome.rule,
                        outcome.attestation.display(),
                        outcome.policies.len(),
                        if outcome.policies.len() == 1 { "y" } else { "ies" }
                    );
                }
                println!();
                println!("Verification PASSED");
            }
            Ok(())
        }
        Err(err) => {
            report_failure(&err, args.json)?;
            process::exit(1);
        }
    }
}

fn report_failure(err: &VerificationError, json: bool) -> Result<()> {
    tracing::debug!(error = ?err, "verification failed");
    if json {
        let json_report = serde_json::json!({
            "passed": false,
            "rule": err.rule_name(),
            "policy_type": err.policy_type(),
            "error": err.root_cause().to_string(),
            "message": err.chain_message(),
        });
        println!("{}", serde_json::to_string_pretty(&json_report)?);
    } else {
        match err.rule_name() {
            Some(rule) => eprintln!("[FAIL] {rule}"),
            None => eprintln!("[FAIL] policy document"),
        }
        eprintln!("  {}", err.chain_message());
        eprintln!();
        eprintln!("Verification FAILED");
    }
    Ok(())
}
