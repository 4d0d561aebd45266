//! # metastream: Leave-One-Task-Out Algorithm Selection Evaluation
//!
//! **Version**: 0.1.0
//!
//! metastream measures how well a meta-learner picks the best streaming
//! classifier for a task. The input is a meta-dataset: one row per task and
//! stream interval, with meta-features and the score every candidate algorithm
//! reached there.
//!
//! ## Pipeline
//!
//! - **Relabel**: the best-scoring candidate becomes the row's `class`
//! - **Partition**: per task, split into train/test/score tables
//! - **Evaluate**: train a meta-learner and a majority-class baseline on the
//!   other tasks, predict the held-out task
//! - **Aggregate**: per task and interval, realized score vs baseline vs best
//!
//! ## Example Usage
//!
//! ```rust
//! use metastream::driver::LeaveOneTaskOut;
//! use metastream::labels::synthesize;
//! use metastream::learner::{ForestParams, MajorityClass, RandomForest};
//! use metastream::table::MetaTable;
//!
//! # fn main() -> metastream::Result<()> {
//! let raw = MetaTable::builder("meta_stream")
//!     .numeric("openml_task_id", vec![1.0, 1.0, 2.0, 2.0])
//!     .numeric("openml_interval_start", vec![0.0, 1000.0, 0.0, 1000.0])
//!     .numeric("openml_classifier_A", vec![0.9, 0.2, 0.1, 0.8])
//!     .numeric("openml_classifier_B", vec![0.1, 0.8, 0.9, 0.2])
//!     .categorical("class", ["A", "B"], ["A", "A", "A", "A"])
//!     .build()?;
//!
//! let table = synthesize(&raw, &["A", "B"])?;
//! let meta = RandomForest::new(ForestParams::default());
//! let driver = LeaveOneTaskOut::new(&table, &meta, &MajorityClass)?;
//!
//! let mut ctx = driver.context();
//! for task_id in driver.tasks().into_keys() {
//!     driver.evaluate_task(task_id, &mut ctx)?;
//! }
//! assert_eq!(ctx.meta.total(), 4);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod labels;
pub mod learner;
pub mod partition;
pub mod projection;
pub mod sink;
pub mod stream;
pub mod table;

pub use error::{Error, Result};
