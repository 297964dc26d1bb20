/// Training-log metric extraction
///
/// Turns the raw console output of a detection training run into a single
/// [`MetricRecord`]: the best overall AP seen, the evaluation breakdown that
/// follows it, and the losses and hyperparameters of the training step that
/// produced it.
///
/// # Architecture
///
/// - `patterns.rs`: Declarative field table (pattern → field → scope)
/// - `extractor.rs`: Two-pass anchor-and-window scan
/// - `model.rs`: Record, field and trace types
/// - `metrics.rs`: Caller-owned aggregate counters
///
/// Extraction is pure and synchronous. Malformed or missing values leave
/// fields unset; there is no error path for text input.

pub mod model;
pub mod patterns;
pub mod extractor;
pub mod metrics;
mod ansi;

// Re-export commonly used types
pub use model::{ExtractError, Extraction, Field, FieldKind, FieldValue, MetricRecord, Scope};
pub use extractor::{extract, Extractor, ExtractorOptions};
pub use patterns::{FieldPattern, FIELD_PATTERNS};
pub use metrics::{ExtractionMetrics, MetricsSnapshot};
pub use ansi::strip_ansi_codes;
