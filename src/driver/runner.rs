//! Full evaluation run from a [`RunConfig`]

use super::{EvaluationContext, LeaveOneTaskOut};
use crate::config::RunConfig;
use crate::labels::synthesize;
use crate::learner::{MajorityClass, RandomForest};
use crate::sink::{LogSink, ReportSink};
use crate::table::io;
use crate::Result;
use tracing::info;

/// Load, relabel, evaluate every task and write both sinks
///
/// Setup (config, schema, I/O) errors abort before any task runs, and
/// schema errors abort before any file is written. The log and
/// report files are closed on every exit path; on success both are flushed.
///
/// # Errors
/// Returns the first fatal error of the run
pub fn run(config: &RunConfig) -> Result<EvaluationContext> {
    config.validate()?;

    let raw = io::load(&config.input)?;
    info!(table = %raw, "loaded meta-dataset");
    let table = synthesize(&raw, &config.candidates)?;
    drop(raw);

    let meta = RandomForest::new(config.forest);
    let baseline = MajorityClass;
    let driver =
        LeaveOneTaskOut::new(&table, &meta, &baseline)?.failure_policy(config.failure_policy);

    if let Some(path) = &config.adjusted_output {
        io::save(&table, path)?;
        info!(path = %path.display(), "saved relabeled meta-dataset");
    }

    let mut log = LogSink::create(&config.log_path)?;
    let mut report = ReportSink::create(&config.report_path)?;
    let mut ctx = driver.context();

    driver.run(&mut ctx, &mut log, &mut report)?;

    log.finish()?;
    report.finish()?;
    Ok(ctx)
}
