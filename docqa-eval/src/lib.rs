//! # docqa-eval
//!
//! Offline answer-quality evaluation for document question answering.
//!
//! Generated answers are scored against reference answers with ROUGE-N or
//! ROUGE-L, and the per-record F-measures are summarized into a report.
//!
//! ## Example
//!
//! ```rust
//! use docqa_eval::{EvalConfig, EvalRecord, EvaluationHarness, RougeMetric};
//!
//! let harness = EvaluationHarness::new(EvalConfig {
//!     metric: RougeMetric::L,
//!     pass_threshold: Some(0.5),
//! })?;
//! let report = harness.evaluate(&[
//!     EvalRecord::new("The capital is Paris.", "Paris is the capital."),
//! ])?;
//! assert_eq!(report.f1.count, 1);
//! # Ok::<(), docqa_eval::EvalError>(())
//! ```

pub mod error;
pub mod harness;
pub mod record;
pub mod rouge;

pub use error::{EvalError, Result};
pub use harness::{EvalConfig, EvalReport, EvaluationHarness, RecordScore, Summary, percentile};
pub use record::{EvalRecord, load_records};
pub use rouge::{RougeMetric, Score, tokenize};
