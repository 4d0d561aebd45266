use anyhow::{Context, Result};
use clap::Parser;
use metastream::config::{parse_candidates, FailurePolicy, RunConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "metastream")]
#[command(about = "Leave-one-task-out evaluation of algorithm-selection meta-learners")]
#[command(version)]
struct Cli {
    /// JSON run configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Meta-dataset (.arff or .parquet)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Evaluator log
    #[arg(long)]
    log: Option<PathBuf>,
    /// Curve report (SQL)
    #[arg(long)]
    report: Option<PathBuf>,
    /// Where to save the relabeled meta-dataset
    #[arg(long, conflicts_with = "no_adjusted")]
    adjusted: Option<PathBuf>,
    /// Don't save the relabeled meta-dataset
    #[arg(long)]
    no_adjusted: bool,
    /// Preset (base, meta, batch-incremental) or comma-separated algorithms
    #[arg(long)]
    candidates: Option<String>,
    /// Skip failed tasks instead of aborting
    #[arg(long)]
    skip_failed: bool,
    /// Trees in the meta-learner forest
    #[arg(long)]
    trees: Option<usize>,
    /// Meta-learner seed
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(input) = self.input {
            config = config.with_input(input);
        }
        if let Some(log) = self.log {
            config = config.with_log_path(log);
        }
        if let Some(report) = self.report {
            config = config.with_report_path(report);
        }
        if self.no_adjusted {
            config = config.with_adjusted_output(None);
        } else if let Some(adjusted) = self.adjusted {
            config = config.with_adjusted_output(Some(adjusted));
        }
        if let Some(candidates) = &self.candidates {
            config = config.with_candidates(parse_candidates(candidates)?);
        }
        if self.skip_failed {
            config = config.with_failure_policy(FailurePolicy::Skip);
        }
        let mut forest = config.forest;
        if let Some(trees) = self.trees {
            forest = forest.num_trees(trees);
        }
        if let Some(seed) = self.seed {
            forest = forest.seed(seed);
        }
        Ok(config.with_forest(forest))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_config()?;
    let ctx = metastream::driver::run(&config)
        .with_context(|| format!("evaluating {}", config.input.display()))?;

    println!("{}", ctx.summary());
    Ok(())
}
