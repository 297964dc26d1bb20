use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

use crate::model::Extraction;

/// Extraction outcome counters
#[derive(Debug, Default)]
pub struct OutcomeMetrics {
    pub logs: AtomicU64,
    pub lines: AtomicU64,
    pub anchored: AtomicU64,
    pub windowed: AtomicU64,
    pub malformed_values: AtomicU64,
    pub fields_populated: AtomicU64,
}

/// Performance totals (aggregate timing)
#[derive(Debug, Default)]
pub struct TotalMetrics {
    pub time_nanos: AtomicU64,
}

/// Aggregate counters for a batch of extractions.
///
/// Owned by the caller: the [`crate::Extractor`] itself keeps no state, so
/// the caller records each [`Extraction`] here after the fact. Inputs that
/// never reached the extractor are the caller's to count. All
/// operations use `Ordering::Relaxed`; `snapshot()` is not transactional
/// across fields.
#[derive(Debug, Default)]
pub struct ExtractionMetrics {
    pub outcomes: OutcomeMetrics,
    pub totals: TotalMetrics,
}

impl ExtractionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished extraction
    #[inline]
    pub fn record_extraction(&self, extraction: &Extraction, time_nanos: u64) {
        let outcomes = &self.outcomes;
        outcomes.logs.fetch_add(1, Ordering::Relaxed);
        outcomes.lines.fetch_add(extraction.lines_scanned as u64, Ordering::Relaxed);
        outcomes.malformed_values.fetch_add(extraction.malformed_values as u64, Ordering::Relaxed);
        outcomes.fields_populated.fetch_add(extraction.record.populated() as u64, Ordering::Relaxed);
        if extraction.has_anchor() {
            outcomes.anchored.fetch_add(1, Ordering::Relaxed);
        }
        if extraction.window.is_some() {
            outcomes.windowed.fetch_add(1, Ordering::Relaxed);
        }

        self.totals.time_nanos.fetch_add(time_nanos, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let logs = self.outcomes.logs.load(Ordering::Relaxed);
        let time_nanos = self.totals.time_nanos.load(Ordering::Relaxed);

        MetricsSnapshot {
            logs_extracted: logs,
            lines_scanned: self.outcomes.lines.load(Ordering::Relaxed),
            logs_with_anchor: self.outcomes.anchored.load(Ordering::Relaxed),
            logs_with_window: self.outcomes.windowed.load(Ordering::Relaxed),
            malformed_values: self.outcomes.malformed_values.load(Ordering::Relaxed),
            fields_populated: self.outcomes.fields_populated.load(Ordering::Relaxed),

            avg_extract_time_us: if logs > 0 {
                (time_nanos as f64 / logs as f64) / 1000.0
            } else {
                0.0
            },
        }
    }
}

/// A read-only snapshot of [`ExtractionMetrics`], cheap to clone and
/// serializable for logs or a batch summary.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub logs_extracted: u64,
    pub lines_scanned: u64,
    pub logs_with_anchor: u64,
    pub logs_with_window: u64,
    pub malformed_values: u64,
    pub fields_populated: u64,

    pub avg_extract_time_us: f64,
}
