//! Staging report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::{SpecCopyPlanEntry, StageError};

/// Outcome of one plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumCopyOutcome {
    /// Destination was written.
    Copied,
    /// Destination was already up to date.
    Skipped,
    /// A later entry writes the same destination; this one was not executed.
    Superseded,
    /// Dry run: destination would have been written.
    Planned,
    /// Entry failed; the batch continued.
    Failed(StageError),
}

/// One plan entry with its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCopyResult {
    /// Entry that was executed.
    pub entry: SpecCopyPlanEntry,
    /// What happened to it.
    pub outcome: EnumCopyOutcome,
}

/// Aggregate counters and diagnostics for one staging run.
#[derive(Debug, Default, Clone)]
pub struct ReportStage {
    /// Number of plan entries handed to the executor.
    pub cnt_planned: u64,
    /// Number of destination files written.
    pub cnt_copied: u64,
    /// Number of entries found up to date.
    pub cnt_skipped: u64,
    /// Number of entries that would be copied (dry run).
    pub cnt_pending: u64,
    /// Number of entries replaced by a later entry for the same destination.
    pub cnt_superseded: u64,
    /// Per-entry outcomes in plan order.
    pub results: Vec<SpecCopyResult>,
    /// Non-fatal warnings collected during resolution/copy.
    pub warnings: Vec<String>,
    /// Resolution failures (per artifact) followed by per-entry copy failures.
    pub errors: Vec<StageError>,
}

impl ReportStage {
    /// Number of collected hard errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// `true` when nothing failed. Pass/fail policy stays with the caller.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Results that ended in [`EnumCopyOutcome::Failed`].
    pub fn failures(&self) -> impl Iterator<Item = &SpecCopyResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, EnumCopyOutcome::Failed(_)))
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_planned".to_string(), self.cnt_planned);
        dict_counts.insert("cnt_copied".to_string(), self.cnt_copied);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_pending".to_string(), self.cnt_pending);
        dict_counts.insert("cnt_superseded".to_string(), self.cnt_superseded);
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} planned={} copied={} skipped={} pending={} superseded={} errors={} warnings={}",
            dict_counts["cnt_planned"],
            dict_counts["cnt_copied"],
            dict_counts["cnt_skipped"],
            dict_counts["cnt_pending"],
            dict_counts["cnt_superseded"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[STAGE]"))
    }
}

/// Mutable accumulator for staging statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportStageBuilder {
    /// See [`ReportStage::cnt_planned`].
    pub cnt_planned: u64,
    /// See [`ReportStage::results`].
    pub results: Vec<SpecCopyResult>,
    /// See [`ReportStage::warnings`].
    pub warnings: Vec<String>,
    /// See [`ReportStage::errors`].
    pub errors: Vec<StageError>,
}

impl ReportStageBuilder {
    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Add one artifact-scoped resolution error.
    pub fn add_error(&mut self, error: StageError) {
        tracing::warn!("{error}");
        self.errors.push(error);
    }

    /// Record the outcome of one entry. Failures are also added to `errors`.
    pub fn add_result(&mut self, entry: SpecCopyPlanEntry, outcome: EnumCopyOutcome) {
        if let EnumCopyOutcome::Failed(error) = &outcome {
            self.add_error(error.clone());
        }
        self.results.push(SpecCopyResult { entry, outcome });
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportStage {
        let mut report = ReportStage {
            cnt_planned: self.cnt_planned,
            results: self.results,
            warnings: self.warnings,
            errors: self.errors,
            ..ReportStage::default()
        };
        for spec_result in &report.results {
            match spec_result.outcome {
                EnumCopyOutcome::Copied => report.cnt_copied += 1,
                EnumCopyOutcome::Skipped => report.cnt_skipped += 1,
                EnumCopyOutcome::Planned => report.cnt_pending += 1,
                EnumCopyOutcome::Superseded => report.cnt_superseded += 1,
                EnumCopyOutcome::Failed(_) => {}
            }
        }
        report
    }
}
