//! The evaluation harness: per-record scores and an aggregate report.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EvalError, Result};
use crate::record::EvalRecord;
use crate::rouge::{self, RougeMetric, Score};

/// Configuration for an evaluation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub metric: RougeMetric,
    /// Records whose F-measure reaches this value count as passed.
    pub pass_threshold: Option<f64>,
}

impl EvalConfig {
    pub fn validate(&self) -> Result<()> {
        if let RougeMetric::N { n: 0 } = self.metric {
            return Err(EvalError::ConfigError("ROUGE-N requires n >= 1".to_string()));
        }
        if let Some(t) = self.pass_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(EvalError::ConfigError(format!(
                    "pass_threshold must be within [0, 1], got {t}"
                )));
            }
        }
        Ok(())
    }
}

/// Score of a single record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordScore {
    /// Record id, or its position in the dataset when it has none.
    pub id: String,
    pub score: Score,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

/// Distribution of F-measures across the dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
}

impl Summary {
    /// Summarize `values`. Returns `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        Some(Self {
            count,
            mean: sorted.iter().sum::<f64>() / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
        })
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Result of an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub metric: RougeMetric,
    pub f1: Summary,
    pub mean_precision: f64,
    pub mean_recall: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_rate: Option<f64>,
    pub records: Vec<RecordScore>,
}

/// Scores generated answers against references.
pub struct EvaluationHarness {
    config: EvalConfig,
}

impl EvaluationHarness {
    pub fn new(config: EvalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Score every record and aggregate.
    pub fn evaluate(&self, records: &[EvalRecord]) -> Result<EvalReport> {
        let scored: Vec<RecordScore> = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let score = rouge::score(self.config.metric, &record.generated, &record.reference);
                RecordScore {
                    id: record.id.clone().unwrap_or_else(|| i.to_string()),
                    score,
                    passed: self.config.pass_threshold.map(|t| score.f1 >= t),
                }
            })
            .collect();

        let f1s: Vec<f64> = scored.iter().map(|r| r.score.f1).collect();
        let f1 = Summary::from_values(&f1s).ok_or(EvalError::EmptyDataset)?;
        let n = scored.len() as f64;
        let mean_precision = scored.iter().map(|r| r.score.precision).sum::<f64>() / n;
        let mean_recall = scored.iter().map(|r| r.score.recall).sum::<f64>() / n;

        let passed = self
            .config
            .pass_threshold
            .map(|_| scored.iter().filter(|r| r.passed == Some(true)).count());
        let pass_rate = passed.map(|p| p as f64 / n);

        info!(
            metric = %self.config.metric,
            records = f1.count,
            mean_f1 = f1.mean,
            p50 = f1.p50,
            passed = ?passed,
            "evaluation complete"
        );

        Ok(EvalReport {
            metric: self.config.metric,
            f1,
            mean_precision,
            mean_recall,
            passed,
            pass_rate,
            records: scored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_percentiles() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64 / 10.0).collect();
        let summary = Summary::from_values(&values).unwrap();
        assert_eq!(summary.p50, 0.5);
        assert_eq!(summary.p90, 0.9);
        assert_eq!(summary.p95, 1.0);
        assert_eq!((summary.min, summary.max), (0.1, 1.0));
        assert!((summary.mean - 0.55).abs() < 1e-12);
    }

    #[test]
    fn single_value_is_every_percentile() {
        let summary = Summary::from_values(&[0.25]).unwrap();
        assert_eq!((summary.p50, summary.p90, summary.p95), (0.25, 0.25, 0.25));
    }

    #[test]
    fn empty_dataset_is_an_error() {
        let harness = EvaluationHarness::new(EvalConfig::default()).unwrap();
        assert!(matches!(harness.evaluate(&[]), Err(EvalError::EmptyDataset)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad_n = EvalConfig { metric: RougeMetric::N { n: 0 }, pass_threshold: None };
        assert!(EvaluationHarness::new(bad_n).is_err());
        let bad_threshold = EvalConfig { pass_threshold: Some(1.5), ..Default::default() };
        assert!(EvaluationHarness::new(bad_threshold).is_err());
    }

    #[test]
    fn pass_rate_counts_records_at_threshold() {
        let harness =
            EvaluationHarness::new(EvalConfig { pass_threshold: Some(0.5), ..Default::default() })
                .unwrap();
        let records = [
            EvalRecord::new("paris is the capital", "paris is the capital").with_id("exact"),
            EvalRecord::new("berlin", "paris is the capital"),
        ];
        let report = harness.evaluate(&records).unwrap();
        assert_eq!(report.passed, Some(1));
        assert_eq!(report.pass_rate, Some(0.5));
        assert_eq!(report.records[0].id, "exact");
        assert_eq!(report.records[1].id, "1");
        assert_eq!(report.records[1].passed, Some(false));
    }
}
