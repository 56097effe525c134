//! Provenant CLI: verify in-toto attestations against a policy document.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

/// Provenant: supply-chain policy verification for in-toto attestations.
///
/// Checks that every attestation a policy document asks for is present,
/// signed by an allowed functionary, and satisfies the document's artifact
/// rules and predicate attributes.
#[derive(Parser)]
#[command(name = "provenant", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (repeat for more detail: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output logs as JSON (for machine consumption).
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Verify a directory of attestations against a policy document.
    Verify(commands::verify::VerifyArgs),
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Verify(args) => commands::verify::execute(args),
    }
}
