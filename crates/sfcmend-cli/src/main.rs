//! sfcmend - repair process models with text-generation oracles
//!
//! ## Commands
//!
//! - `refine`: repair candidates until their references are contained in them
//! - `check`: verify a pair once and file the candidate by verdict

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use oracle_gateway::instantiate_oracles;
use sfc_model::PathVerifier;
use sfcmend_core::{
    check_pair, discover_pairs, BatchInput, BatchReport, BatchRunner, CheckResult, RunConfig,
};
use tracing::{info, Level};

const DEFAULT_CONFIG: &str = "sfcmend.toml";

#[derive(Parser)]
#[command(name = "sfcmend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Oracle-driven repair of sequential function charts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair candidate models against reference models
    Refine {
        /// Reference model file, or a directory of reference models
        #[arg(short, long)]
        reference: PathBuf,

        /// Candidate model file, or a directory of candidates
        #[arg(short, long)]
        candidate: PathBuf,

        /// Run configuration (default: ./sfcmend.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Oracles to use, by configured name (default: all configured)
        #[arg(short, long, value_delimiter = ',')]
        oracle: Vec<String>,

        /// Verification passes per session
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Output root; results land in <root>/<oracle>/
        #[arg(long)]
        result_root: Option<PathBuf>,

        /// Prompt template file
        #[arg(long)]
        prompt_template: Option<PathBuf>,

        /// Directory for last prompt/reply debug files
        #[arg(long)]
        debug_dir: Option<PathBuf>,

        /// Token cost CSV path
        #[arg(long)]
        cost_export: Option<PathBuf>,

        /// Path enumeration cap for the verifier
        #[arg(long)]
        max_paths: Option<usize>,

        /// Print the batch report as JSON
        #[arg(long)]
        summary_json: bool,
    },

    /// Verify a candidate once and move it under <dest>/{success|failed}/
    Check {
        /// Reference model file
        #[arg(short, long)]
        reference: PathBuf,

        /// Candidate model file (moved by this command)
        #[arg(short, long)]
        candidate: PathBuf,

        /// Destination root
        #[arg(short, long, default_value = "output")]
        dest: PathBuf,

        /// Path enumeration cap for the verifier
        #[arg(long, default_value_t = 256)]
        max_paths: usize,
    },
}

/// CLI values that win over the config file.
#[derive(Debug, Default)]
struct Overrides {
    max_attempts: Option<u32>,
    result_root: Option<PathBuf>,
    prompt_template: Option<PathBuf>,
    debug_dir: Option<PathBuf>,
    cost_export: Option<PathBuf>,
    max_paths: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut RunConfig) {
        if let Some(n) = self.max_attempts {
            config.max_attempts = n;
        }
        if let Some(root) = self.result_root {
            config.result_root = root;
        }
        if self.prompt_template.is_some() {
            config.prompt_template = self.prompt_template;
        }
        if self.debug_dir.is_some() {
            config.debug_dir = self.debug_dir;
        }
        if self.cost_export.is_some() {
            config.cost_export = self.cost_export;
        }
        if let Some(n) = self.max_paths {
            config.max_paths = n;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sfcmend_core::init_tracing(cli.json, level);

    // Credentials may live in a local .env file.
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Refine {
            reference,
            candidate,
            config,
            oracle,
            max_attempts,
            result_root,
            prompt_template,
            debug_dir,
            cost_export,
            max_paths,
            summary_json,
        } => {
            let mut run_config = load_config(config.as_deref())?;
            Overrides {
                max_attempts,
                result_root,
                prompt_template,
                debug_dir,
                cost_export,
                max_paths,
            }
            .apply(&mut run_config);
            let report = cmd_refine(&run_config, &reference, &candidate, &oracle).await?;
            print_report(&report, summary_json)
        }
        Commands::Check {
            reference,
            candidate,
            dest,
            max_paths,
        } => {
            let result = cmd_check(&reference, &candidate, &dest, max_paths)?;
            print_check(&result);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(p) => RunConfig::load(p).with_context(|| format!("Failed to load config {}", p.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => RunConfig::load(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to load {DEFAULT_CONFIG}")),
        None => Ok(RunConfig::default()),
    }
}

async fn cmd_refine(
    config: &RunConfig,
    reference: &Path,
    candidate: &Path,
    requested: &[String],
) -> Result<BatchReport> {
    config.policy().context("Invalid repair policy")?;

    let names: Vec<String> = if requested.is_empty() {
        config.oracles.iter().map(|o| o.name.clone()).collect()
    } else {
        requested.to_vec()
    };
    if names.is_empty() {
        bail!("no oracles configured; add [[oracles]] tables to {DEFAULT_CONFIG} or pass --config");
    }
    let oracles =
        instantiate_oracles(&names, &config.oracles).context("Failed to set up oracles")?;

    let pairs = discover_pairs(&BatchInput::from_paths(reference, candidate))
        .context("Failed to enumerate model pairs")?;
    if pairs.is_empty() {
        bail!("no model pairs found under {}", reference.display());
    }

    info!(
        pairs = pairs.len(),
        oracles = oracles.len(),
        max_attempts = config.max_attempts,
        "starting refinement"
    );

    let verifier = PathVerifier::new(config.max_paths);
    let runner = BatchRunner::new(config, &verifier).context("Failed to prepare batch")?;
    runner
        .run(&pairs, &oracles)
        .await
        .context("Batch run failed")
}

fn cmd_check(reference: &Path, candidate: &Path, dest: &Path, max_paths: usize) -> Result<CheckResult> {
    let verifier = PathVerifier::new(max_paths);
    check_pair(&verifier, reference, candidate, dest)
        .with_context(|| format!("Failed to check {}", candidate.display()))
}

fn print_report(report: &BatchReport, as_json: bool) -> Result<()> {
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        );
        return Ok(());
    }

    for s in &report.sessions {
        println!(
            "[{}] {}: {} ({} iteration(s), {} tokens)",
            s.oracle, s.pair, s.outcome, s.iterations, s.tokens_used
        );
    }
    println!();
    for oracle in report.ledger.oracles() {
        println!(
            "{:<20} {} tokens",
            oracle,
            report.ledger.total_for_oracle(oracle)
        );
    }
    println!(
        "Contained: {}/{}",
        report.contained_count(),
        report.sessions.len()
    );
    if let Some(path) = &report.cost_export {
        println!("Cost table: {}", path.display());
    }
    Ok(())
}

fn print_check(result: &CheckResult) {
    if result.verdict.contained {
        println!("contained");
    } else {
        println!(
            "not contained ({} unmatched path(s))",
            result.verdict.unmatched_paths.len()
        );
    }
    println!("Moved to: {}", result.classification.moved_path.display());
    println!("Report:   {}", result.classification.report_path.display());
}
