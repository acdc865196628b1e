//! prompt_preview - print the instruction the router would select.
//!
//! Small inspection tool for prompt-bank edits: shows the formatted
//! template for a tier or a numeric risk weight without running a video.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use event_cascade::{CascadeConfig, HazardTier, PromptRouter};

#[derive(Parser, Debug)]
#[command(name = "prompt_preview", about = "Preview routed prompt templates")]
struct Args {
    /// Config file path (TOML). Defaults to CASCADE_CONFIG or builtins.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select by severity tier (critical, high, standard, none)
    Tier {
        tier: String,
        /// Detected class names appended as the prompt suffix
        #[arg(long, value_delimiter = ',')]
        classes: Vec<String>,
    },
    /// Select by numeric risk weight against the configured thresholds
    Weight {
        weight: f32,
        #[arg(long, value_delimiter = ',')]
        classes: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CascadeConfig::load_path(path)?,
        None => CascadeConfig::load()?,
    };
    let router = PromptRouter::new(
        config.build_prompt_bank(),
        config.prompting.strategy,
        config.prompting.tau_high,
        config.prompting.tau_critical,
    )?;

    let prompt = match &args.command {
        Command::Tier { tier, classes } => {
            let tier = HazardTier::parse(tier)
                .ok_or_else(|| anyhow!("unknown tier '{}'", tier))?;
            router.select(tier, classes)
        }
        Command::Weight { weight, classes } => router.select_by_weight(*weight, classes),
    };

    println!("{}", prompt);
    Ok(())
}
