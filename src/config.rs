//! Run configuration
//!
//! Loaded from JSON (every field optional) and/or built programmatically:
//!
//! ```rust
//! use metastream::config::{CandidatePreset, FailurePolicy, RunConfig};
//!
//! let config = RunConfig::default()
//!     .with_candidates(CandidatePreset::Meta.algorithms())
//!     .with_failure_policy(FailurePolicy::Skip);
//! assert_eq!(config.candidates.len(), 4);
//! ```

use crate::learner::ForestParams;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What the driver does when a task fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run on the first failed task
    #[default]
    Abort,
    /// Report the failed task and continue with the next one
    Skip,
}

/// Named candidate algorithm sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePreset {
    /// Single streaming learners
    Base,
    /// Streaming ensembles
    Meta,
    /// Batch learners wrapped for streams
    BatchIncremental,
}

impl CandidatePreset {
    /// Algorithm names of the preset, in scan order
    #[must_use]
    pub fn algorithms(self) -> Vec<String> {
        let names: &[&str] = match self {
            Self::Base => &[
                "moa.kNN(1)",
                "moa.HoeffdingTree(1)",
                "moa.SGD(1)",
                "moa.NaiveBayes(1)",
                "moa.SPegasos(1)",
            ],
            Self::Meta => &[
                "moa.LeveragingBag_HoeffdingTree(1)",
                "moa.LeveragingBag_kNN(1)",
                "moa.OzaBoostAdwin_HoeffdingTree(1)",
                "moa.OzaBagAdwin_HoeffdingTree(1)",
            ],
            Self::BatchIncremental => &["moa.WEKAClassifier_J48(1)", "moa.WEKAClassifier_OneR(1)"],
        };
        names.iter().map(|n| (*n).to_string()).collect()
    }
}

impl FromStr for CandidatePreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base" => Ok(Self::Base),
            "meta" => Ok(Self::Meta),
            "batch-incremental" => Ok(Self::BatchIncremental),
            other => Err(Error::Config(format!("unknown candidate preset `{other}`"))),
        }
    }
}

/// Parse a preset name or a comma-separated algorithm list
///
/// # Errors
/// Returns `Error::Config` if the list is empty
pub fn parse_candidates(text: &str) -> Result<Vec<String>> {
    if let Ok(preset) = text.parse::<CandidatePreset>() {
        return Ok(preset.algorithms());
    }
    let names: Vec<String> = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(Error::Config("empty candidate list".to_string()));
    }
    Ok(names)
}

/// Everything one evaluation run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Meta-dataset (`.arff` or `.parquet`)
    pub input: PathBuf,
    /// Where to save the relabeled meta-dataset, if anywhere
    pub adjusted_output: Option<PathBuf>,
    /// Evaluator log
    pub log_path: PathBuf,
    /// Curve report
    pub report_path: PathBuf,
    /// Candidate algorithms, in tie-break order
    pub candidates: Vec<String>,
    /// Failed-task handling
    pub failure_policy: FailurePolicy,
    /// Meta-learner hyperparameters
    pub forest: ForestParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("meta_stream.arff"),
            adjusted_output: Some(PathBuf::from("meta_stream_adjusted.arff")),
            log_path: PathBuf::from("evaluator.log"),
            report_path: PathBuf::from("curves.sql"),
            candidates: CandidatePreset::Base.algorithms(),
            failure_policy: FailurePolicy::Abort,
            forest: ForestParams::default(),
        }
    }
}

impl RunConfig {
    /// Load a JSON configuration file
    ///
    /// # Errors
    /// Returns `Error::Config` naming the file if it can't be read or parsed
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before any file is touched
    ///
    /// # Errors
    /// Returns `Error::Config` for an empty candidate list or a forest
    /// without trees
    pub fn validate(&self) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(Error::Config("no candidate algorithms configured".to_string()));
        }
        if self.forest.num_trees == 0 {
            return Err(Error::Config("forest.num_trees must be positive".to_string()));
        }
        Ok(())
    }

    /// Set the meta-dataset path
    #[must_use]
    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = input.into();
        self
    }

    /// Set (or disable) the relabeled output path
    #[must_use]
    pub fn with_adjusted_output(mut self, path: Option<PathBuf>) -> Self {
        self.adjusted_output = path;
        self
    }

    /// Set the log path
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Set the report path
    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    /// Set the candidate algorithms
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Set the failure policy
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the forest hyperparameters
    #[must_use]
    pub const fn with_forest(mut self, forest: ForestParams) -> Self {
        self.forest = forest;
        self
    }
}
