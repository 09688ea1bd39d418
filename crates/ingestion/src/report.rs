//! Per-stage run reports.

use serde::Serialize;
use tracing::{info, warn};

/// Counters for one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    /// Units that were processed successfully
    pub processed: usize,
    /// Units skipped because their output already existed
    pub skipped_existing: usize,
    /// Units kept by a filter
    pub kept: usize,
    /// Units rejected by a filter
    pub discarded: usize,
    /// Units that failed
    pub failed: usize,
    /// `(unit, error)` for each failure
    pub failures: Vec<(String, String)>,
}

impl StageReport {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Default::default()
        }
    }

    pub fn record_failure(&mut self, unit: impl Into<String>, error: impl ToString) {
        self.failed += 1;
        self.failures.push((unit.into(), error.to_string()));
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Emit the completion summary.
    pub fn log(&self) {
        if self.has_failures() {
            warn!(
                stage = %self.stage,
                processed = self.processed,
                skipped_existing = self.skipped_existing,
                kept = self.kept,
                discarded = self.discarded,
                failed = self.failed,
                "Stage completed with failures"
            );
        } else {
            info!(
                stage = %self.stage,
                processed = self.processed,
                skipped_existing = self.skipped_existing,
                kept = self.kept,
                discarded = self.discarded,
                "Stage completed"
            );
        }
    }
}
