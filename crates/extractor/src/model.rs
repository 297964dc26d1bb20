use std::fmt;
use std::ops::Range;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Every field a [`MetricRecord`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Overall AP @ IoU 0.50:0.95, area=all (the anchor)
    AveragePrecision,
    Ap50,
    Ap75,
    ApSmall,
    ApMedium,
    ApLarge,
    TotalLoss,
    ClassificationLoss,
    BoxRegressionLoss,
    RpnClassificationLoss,
    RpnLocalizationLoss,
    /// Training step count
    Iterations,
    LearningRate,
    BatchSize,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::AveragePrecision,
        Field::Ap50,
        Field::Ap75,
        Field::ApSmall,
        Field::ApMedium,
        Field::ApLarge,
        Field::TotalLoss,
        Field::ClassificationLoss,
        Field::BoxRegressionLoss,
        Field::RpnClassificationLoss,
        Field::RpnLocalizationLoss,
        Field::Iterations,
        Field::LearningRate,
        Field::BatchSize,
    ];

    /// Wire key used by the persistence layer
    pub fn key(&self) -> &'static str {
        match self {
            Field::AveragePrecision => "ap",
            Field::Ap50 => "ap50",
            Field::Ap75 => "ap75",
            Field::ApSmall => "aps",
            Field::ApMedium => "apm",
            Field::ApLarge => "apl",
            Field::TotalLoss => "total_loss",
            Field::ClassificationLoss => "loss_cls",
            Field::BoxRegressionLoss => "loss_box_reg",
            Field::RpnClassificationLoss => "loss_rpn_cls",
            Field::RpnLocalizationLoss => "loss_rpn_loc",
            Field::Iterations => "iterations",
            Field::LearningRate => "learning_rate",
            Field::BatchSize => "batch_size",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Iterations | Field::BatchSize => FieldKind::Count,
            _ => FieldKind::Float,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Precision, loss and rate metrics
    Float,
    /// Step and batch counts
    Count,
}

/// Where in the log a field is resolved, relative to the anchor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Whole log, maximum wins
    Anchor,
    /// From the anchor line forward to end of log, first match wins
    AfterAnchor,
    /// `[iteration line, anchor line)`, first match wins
    Window,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Anchor => "anchor",
            Scope::AfterAnchor => "after_anchor",
            Scope::Window => "window",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Count(u64),
}

impl FieldValue {
    /// Column default the storage layer substitutes for an unset field
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Float => FieldValue::Float(0.0),
            FieldKind::Count => FieldValue::Count(0),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Count(v) => write!(f, "{}", v),
        }
    }
}

/// Outcome of offering a raw capture to a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    Filled,
    AlreadySet,
    Malformed,
}

/// Best-checkpoint metrics of one training run.
///
/// `average_precision` is always present (0.0 when no AP line exists); every
/// other field is `None` unless the matching line was found in its scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricRecord {
    #[serde(rename = "ap")]
    pub average_precision: f64,
    pub ap50: Option<f64>,
    pub ap75: Option<f64>,
    #[serde(rename = "aps")]
    pub ap_small: Option<f64>,
    #[serde(rename = "apm")]
    pub ap_medium: Option<f64>,
    #[serde(rename = "apl")]
    pub ap_large: Option<f64>,

    pub total_loss: Option<f64>,
    #[serde(rename = "loss_cls")]
    pub classification_loss: Option<f64>,
    #[serde(rename = "loss_box_reg")]
    pub box_regression_loss: Option<f64>,
    #[serde(rename = "loss_rpn_cls")]
    pub rpn_classification_loss: Option<f64>,
    #[serde(rename = "loss_rpn_loc")]
    pub rpn_localization_loss: Option<f64>,

    pub iterations: Option<u64>,
    pub learning_rate: Option<f64>,
    pub batch_size: Option<u64>,
}

impl MetricRecord {
    /// Read a field. `AveragePrecision` is always `Some`.
    pub fn get(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::AveragePrecision => Some(FieldValue::Float(self.average_precision)),
            Field::Iterations => self.iterations.map(FieldValue::Count),
            Field::BatchSize => self.batch_size.map(FieldValue::Count),
            _ => self.float_slot(field).and_then(|slot| *slot).map(FieldValue::Float),
        }
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    /// Number of optional fields holding a value
    pub fn populated(&self) -> usize {
        Field::ALL
            .iter()
            .filter(|f| **f != Field::AveragePrecision && self.is_set(**f))
            .count()
    }

    /// Offer a raw numeric capture to `field`. Never overwrites.
    pub(crate) fn fill(&mut self, field: Field, raw: &str) -> Fill {
        if field == Field::AveragePrecision {
            // the anchor is resolved by maximum, not first match
            return Fill::AlreadySet;
        }
        if self.is_set(field) {
            return Fill::AlreadySet;
        }

        match field.kind() {
            FieldKind::Count => {
                let Ok(value) = raw.parse::<u64>() else {
                    return Fill::Malformed;
                };
                match field {
                    Field::Iterations => self.iterations = Some(value),
                    Field::BatchSize => self.batch_size = Some(value),
                    _ => return Fill::Malformed,
                }
            }
            FieldKind::Float => {
                let Some(value) = parse_float(raw) else {
                    return Fill::Malformed;
                };
                match self.float_slot_mut(field) {
                    Some(slot) => *slot = Some(value),
                    None => return Fill::Malformed,
                }
            }
        }
        Fill::Filled
    }

    fn float_slot(&self, field: Field) -> Option<&Option<f64>> {
        match field {
            Field::Ap50 => Some(&self.ap50),
            Field::Ap75 => Some(&self.ap75),
            Field::ApSmall => Some(&self.ap_small),
            Field::ApMedium => Some(&self.ap_medium),
            Field::ApLarge => Some(&self.ap_large),
            Field::TotalLoss => Some(&self.total_loss),
            Field::ClassificationLoss => Some(&self.classification_loss),
            Field::BoxRegressionLoss => Some(&self.box_regression_loss),
            Field::RpnClassificationLoss => Some(&self.rpn_classification_loss),
            Field::RpnLocalizationLoss => Some(&self.rpn_localization_loss),
            Field::LearningRate => Some(&self.learning_rate),
            Field::AveragePrecision | Field::Iterations | Field::BatchSize => None,
        }
    }

    fn float_slot_mut(&mut self, field: Field) -> Option<&mut Option<f64>> {
        match field {
            Field::Ap50 => Some(&mut self.ap50),
            Field::Ap75 => Some(&mut self.ap75),
            Field::ApSmall => Some(&mut self.ap_small),
            Field::ApMedium => Some(&mut self.ap_medium),
            Field::ApLarge => Some(&mut self.ap_large),
            Field::TotalLoss => Some(&mut self.total_loss),
            Field::ClassificationLoss => Some(&mut self.classification_loss),
            Field::BoxRegressionLoss => Some(&mut self.box_regression_loss),
            Field::RpnClassificationLoss => Some(&mut self.rpn_classification_loss),
            Field::RpnLocalizationLoss => Some(&mut self.rpn_localization_loss),
            Field::LearningRate => Some(&mut self.learning_rate),
            Field::AveragePrecision | Field::Iterations | Field::BatchSize => None,
        }
    }
}

/// Parse a float capture. Rejects anything `f64::from_str` accepts that is
/// not a plain decimal (`inf`, `NaN`) as well as literals like `0.4.2`.
pub(crate) fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Result of one extraction call together with how it was resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub record: MetricRecord,
    /// Line holding the maximum AP
    pub anchor_line: Option<usize>,
    /// Line range scanned for losses and hyperparameters
    pub window: Option<Range<usize>>,
    pub lines_scanned: usize,
    /// Captures that matched a pattern but did not parse as a number
    pub malformed_values: usize,
}

impl Extraction {
    pub fn into_record(self) -> MetricRecord {
        self.record
    }

    pub fn has_anchor(&self) -> bool {
        self.anchor_line.is_some()
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid pattern for {field}: {reason}")]
    InvalidPattern { field: Field, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_is_unset() {
        let record = MetricRecord::default();
        assert_eq!(record.average_precision, 0.0);
        assert_eq!(record.populated(), 0);
        assert_eq!(record.get(Field::AveragePrecision), Some(FieldValue::Float(0.0)));
        assert_eq!(record.get(Field::TotalLoss), None);
    }

    #[test]
    fn test_fill_first_match_wins() {
        let mut record = MetricRecord::default();
        assert_eq!(record.fill(Field::TotalLoss, "1.25"), Fill::Filled);
        assert_eq!(record.fill(Field::TotalLoss, "0.75"), Fill::AlreadySet);
        assert_eq!(record.total_loss, Some(1.25));
    }

    #[test]
    fn test_fill_counts() {
        let mut record = MetricRecord::default();
        assert_eq!(record.fill(Field::Iterations, "19999"), Fill::Filled);
        assert_eq!(record.fill(Field::BatchSize, "16"), Fill::Filled);
        assert_eq!(record.iterations, Some(19999));
        assert_eq!(record.batch_size, Some(16));
        assert_eq!(record.populated(), 2);
    }

    #[test]
    fn test_fill_malformed_leaves_field_unset() {
        let mut record = MetricRecord::default();
        assert_eq!(record.fill(Field::LearningRate, "0.0.2"), Fill::Malformed);
        assert_eq!(record.fill(Field::Iterations, "12.5"), Fill::Malformed);
        assert_eq!(record.fill(Field::Ap50, "."), Fill::Malformed);
        assert_eq!(record.learning_rate, None);
        assert_eq!(record.iterations, None);
        assert_eq!(record.ap50, None);

        // a later well-formed capture may still fill it
        assert_eq!(record.fill(Field::LearningRate, "0.02"), Fill::Filled);
        assert_eq!(record.learning_rate, Some(0.02));
    }

    #[test]
    fn test_fill_never_touches_anchor() {
        let mut record = MetricRecord::default();
        assert_eq!(record.fill(Field::AveragePrecision, "0.5"), Fill::AlreadySet);
        assert_eq!(record.average_precision, 0.0);
    }

    #[test]
    fn test_parse_float_rejects_non_finite() {
        assert_eq!(parse_float("0.423"), Some(0.423));
        assert_eq!(parse_float("-1.000"), Some(-1.0));
        assert_eq!(parse_float("inf"), None);
        assert_eq!(parse_float("NaN"), None);
    }

    #[test]
    fn test_serialize_uses_wire_keys() {
        let record = MetricRecord {
            average_precision: 0.4,
            ap_small: Some(0.2),
            classification_loss: Some(0.3),
            iterations: Some(100),
            ..Default::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ap"], 0.4);
        assert_eq!(json["aps"], 0.2);
        assert_eq!(json["loss_cls"], 0.3);
        assert_eq!(json["iterations"], 100);
        assert!(json["ap50"].is_null());
        assert!(json["batch_size"].is_null());

        let keys: Vec<&str> = Field::ALL.iter().map(|f| f.key()).collect();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), keys.len());
        for key in keys {
            assert!(object.contains_key(key), "missing key {}", key);
        }
    }

    #[test]
    fn test_deserialize_partial_record() {
        let record: MetricRecord = serde_json::from_str(r#"{"ap50": 0.61, "lr": 1}"#).unwrap();
        assert_eq!(record.average_precision, 0.0);
        assert_eq!(record.ap50, Some(0.61));
        assert_eq!(record.learning_rate, None);
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(Field::Iterations.kind(), FieldKind::Count);
        assert_eq!(Field::BatchSize.kind(), FieldKind::Count);
        assert_eq!(Field::LearningRate.kind(), FieldKind::Float);
        assert_eq!(Field::ApLarge.to_string(), "apl");
    }
}
