//! Report — what the tracker hands downstream for each extracted run.
//!
//! The extractor leaves unset fields unset. Substituting storage defaults
//! is a caller decision and only happens here, behind `fill_defaults`.

use std::io::{self, Write};
use std::ops::Range;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use extractor::{Extraction, Field, FieldValue, MetricRecord};

use crate::config::OutputFormat;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub source: String,
    pub extracted_at: DateTime<Utc>,
    pub metrics: ReportMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceSummary>,
}

impl RunReport {
    pub fn new(
        run_id: String,
        source: String,
        extraction: Extraction,
        fill_defaults: bool,
        with_trace: bool,
    ) -> Self {
        let trace = with_trace.then(|| TraceSummary::from(&extraction));
        Self {
            run_id,
            source,
            extracted_at: Utc::now(),
            metrics: ReportMetrics {
                record: extraction.into_record(),
                fill_defaults,
            },
            trace,
        }
    }
}

/// The record as it leaves the tracker, keyed by storage column name.
#[derive(Debug, Clone)]
pub struct ReportMetrics {
    pub record: MetricRecord,
    pub fill_defaults: bool,
}

impl ReportMetrics {
    pub fn value(&self, field: Field) -> Option<FieldValue> {
        self.record.get(field).or_else(|| {
            self.fill_defaults
                .then(|| FieldValue::default_for(field.kind()))
        })
    }
}

impl Serialize for ReportMetrics {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(Field::ALL.len()))?;
        for field in Field::ALL {
            map.serialize_entry(field.key(), &self.value(field))?;
        }
        map.end()
    }
}

/// Where the anchor and the loss window were found
#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub anchor_line: Option<usize>,
    pub window: Option<Range<usize>>,
    pub lines_scanned: usize,
    pub malformed_values: usize,
}

impl From<&Extraction> for TraceSummary {
    fn from(extraction: &Extraction) -> Self {
        Self {
            anchor_line: extraction.anchor_line,
            window: extraction.window.clone(),
            lines_scanned: extraction.lines_scanned,
            malformed_values: extraction.malformed_values,
        }
    }
}

pub fn render<W: Write>(reports: &[RunReport], format: OutputFormat, out: &mut W) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, reports)?;
            writeln!(out)?;
        }
        OutputFormat::Jsonl => {
            for report in reports {
                serde_json::to_writer(&mut *out, report)?;
                writeln!(out)?;
            }
        }
        OutputFormat::Table => {
            for (i, report) in reports.iter().enumerate() {
                if i > 0 {
                    writeln!(out)?;
                }
                render_table(report, out)?;
            }
        }
    }
    out.flush()
}

fn render_table<W: Write>(report: &RunReport, out: &mut W) -> io::Result<()> {
    writeln!(out, "run {} ({})", report.run_id, report.source)?;

    if let Some(trace) = &report.trace {
        let anchor = trace
            .anchor_line
            .map(|line| line.to_string())
            .unwrap_or_else(|| "-".to_string());
        let window = trace
            .window
            .as_ref()
            .map(|w| format!("{}..{}", w.start, w.end))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "  anchor line {}, window {}, {} lines, {} malformed",
            anchor, window, trace.lines_scanned, trace.malformed_values
        )?;
    }

    for field in Field::ALL {
        let value = report
            .metrics
            .value(field)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(out, "  {:<14} {}", field.key(), value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction() -> Extraction {
        Extraction {
            record: MetricRecord {
                average_precision: 0.512,
                ap50: Some(0.701),
                total_loss: Some(0.7),
                iterations: Some(9999),
                ..Default::default()
            },
            anchor_line: Some(14),
            window: Some(12..14),
            lines_scanned: 20,
            malformed_values: 0,
        }
    }

    fn report(fill_defaults: bool, with_trace: bool) -> RunReport {
        RunReport::new(
            "faster_rcnn".to_string(),
            "logs/faster_rcnn.log".to_string(),
            extraction(),
            fill_defaults,
            with_trace,
        )
    }

    #[test]
    fn test_unset_fields_serialize_as_null() {
        let json = serde_json::to_value(report(false, false)).unwrap();
        let metrics = &json["metrics"];
        assert_eq!(json["run_id"], "faster_rcnn");
        assert_eq!(metrics["ap"], 0.512);
        assert_eq!(metrics["ap50"], 0.701);
        assert_eq!(metrics["iterations"], 9999);
        assert!(metrics["ap75"].is_null());
        assert!(metrics["batch_size"].is_null());
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn test_fill_defaults_substitutes_zeroes() {
        let json = serde_json::to_value(report(true, false)).unwrap();
        let metrics = &json["metrics"];
        assert_eq!(metrics["ap75"], 0.0);
        assert_eq!(metrics["batch_size"], 0);
        assert!(metrics["batch_size"].is_u64());
        assert_eq!(metrics["total_loss"], 0.7);
        assert_eq!(metrics.as_object().unwrap().len(), Field::ALL.len());
    }

    #[test]
    fn test_trace_included_on_request() {
        let json = serde_json::to_value(report(false, true)).unwrap();
        assert_eq!(json["trace"]["anchor_line"], 14);
        assert_eq!(json["trace"]["window"]["start"], 12);
        assert_eq!(json["trace"]["window"]["end"], 14);
    }

    #[test]
    fn test_render_jsonl_one_line_per_report() {
        let reports = vec![report(false, false), report(true, false)];
        let mut out = Vec::new();
        render(&reports, OutputFormat::Jsonl, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["metrics"]["ap"], 0.512);
        }
    }

    #[test]
    fn test_render_json_array() {
        let mut out = Vec::new();
        render(&[report(false, false)], OutputFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_render_table() {
        let mut out = Vec::new();
        render(&[report(false, true)], OutputFormat::Table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("run faster_rcnn (logs/faster_rcnn.log)"));
        assert!(text.contains("anchor line 14, window 12..14"));
        assert!(text.contains("  ap             0.512"));
        assert!(text.contains("  ap75           -"));
        assert!(text.contains("  iterations     9999"));
    }
}
