//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cooldowns::CooldownsArgs;
use commands::policy::PolicyArgs;
use commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "remedy-intake")]
#[command(about = "Admission control and cooldown persistence for event remediation", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to .remedy/config.yaml and .remedy/local.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay events through the intake engine
    Run(RunArgs),

    /// Inspect persisted cooldown state
    Cooldowns(CooldownsArgs),

    /// Validate remediation policies
    Policy(PolicyArgs),
}

/// Print `err` with its cause chain and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": causes,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}
