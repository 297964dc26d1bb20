//! Run — the `parse` and `patterns` commands.

use std::io::Write;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{error, info};

use extractor::{Extractor, ExtractorOptions, ExtractionMetrics, MetricsSnapshot, FIELD_PATTERNS};

use crate::config::{OutputFormat, TrackerConfig};
use crate::input::{InputErrorMetrics, InputErrorSnapshot, LogSource};
use crate::report::{render, RunReport};

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// Log files to extract from (`-` for stdin)
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Run id for a single input (defaults to the file stem)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output format (overrides output.format)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Substitute 0 for fields the log did not provide
    #[arg(long)]
    pub fill_defaults: bool,

    /// Include anchor line and loss window in each report
    #[arg(long)]
    pub trace: bool,

    /// Print batch counters to stderr when done
    #[arg(long)]
    pub stats: bool,
}

/// Extraction counters and input failures for one batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchStats {
    #[serde(flatten)]
    pub extraction: MetricsSnapshot,
    #[serde(flatten)]
    pub inputs: InputErrorSnapshot,
    pub success_rate: f64,
}

impl BatchStats {
    fn new(extraction: MetricsSnapshot, inputs: InputErrorSnapshot) -> Self {
        let attempts = extraction.logs_extracted + inputs.total();
        let success_rate = if attempts > 0 {
            extraction.logs_extracted as f64 / attempts as f64
        } else {
            1.0
        };
        Self { extraction, inputs, success_rate }
    }
}

/// Outcome of a `parse` batch
#[derive(Debug)]
pub struct BatchSummary {
    pub reports: Vec<RunReport>,
    pub stats: BatchStats,
}

impl BatchSummary {
    pub fn failed(&self) -> u64 {
        self.stats.inputs.total()
    }
}

/// Extract every input and render the reports to `out`. A failed input is
/// logged and counted; the rest of the batch still runs.
pub fn run_parse<W: Write>(args: &ParseArgs, config: &TrackerConfig, out: &mut W) -> Result<BatchSummary> {
    if args.run_id.is_some() && args.files.len() > 1 {
        anyhow::bail!("--run-id can only be used with a single input");
    }

    let extractor = Extractor::new(ExtractorOptions {
        strip_ansi: config.extraction.strip_ansi,
    })
    .context("Failed to build extractor")?;

    let fill_defaults = args.fill_defaults || config.output.fill_defaults;
    let format = args.format.unwrap_or(config.output.format);
    let metrics = ExtractionMetrics::new();
    let input_errors = InputErrorMetrics::new();
    let mut reports = Vec::with_capacity(args.files.len());

    for arg in &args.files {
        let source = LogSource::from_arg(arg);
        let text = match source.read(config.input.max_log_bytes) {
            Ok(text) => text,
            Err(e) => {
                error!(source = %source, "Skipping input: {}", e);
                input_errors.record(e.kind());
                continue;
            }
        };

        let started = Instant::now();
        let extraction = extractor.extract_with_trace(&text);
        metrics.record_extraction(&extraction, saturating_nanos(started.elapsed()));

        let run_id = args
            .run_id
            .clone()
            .unwrap_or_else(|| source.default_run_id());

        info!(
            run_id = %run_id,
            ap = extraction.record.average_precision,
            anchor_line = ?extraction.anchor_line,
            populated = extraction.record.populated(),
            "Extracted run"
        );

        reports.push(RunReport::new(
            run_id,
            source.to_string(),
            extraction,
            fill_defaults,
            args.trace,
        ));
    }

    render(&reports, format, out).context("Failed to write reports")?;

    let stats = BatchStats::new(metrics.snapshot(), input_errors.snapshot());
    info!(
        extracted = stats.extraction.logs_extracted,
        failed = stats.inputs.total(),
        avg_extract_time_us = stats.extraction.avg_extract_time_us,
        "Batch complete"
    );

    Ok(BatchSummary { reports, stats })
}

/// Nanoseconds in `elapsed`, pinned at `u64::MAX` (~584 years)
fn saturating_nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// Print the field table: key, scope and pattern per field
pub fn print_patterns<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{:<14} {:<13} pattern", "field", "scope")?;
    for pattern in FIELD_PATTERNS {
        writeln!(
            out,
            "{:<14} {:<13} {}",
            pattern.field.key(),
            pattern.scope.as_str(),
            pattern.source
        )?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
[06/12 10:21:33 d2.utils.events]:  eta: 0:10:02  iter: 19  total_loss: 1.873  loss_cls: 0.912  lr: 0.0004
 Average Precision  (AP) @[ IoU=0.50:0.95 | area=   all | maxDets=100 ] = 0.387
 Average Precision  (AP) @[ IoU=0.50      | area=   all | maxDets=100 ] = 0.588
";

    fn args(files: Vec<String>) -> ParseArgs {
        ParseArgs {
            files,
            run_id: None,
            format: Some(OutputFormat::Jsonl),
            fill_defaults: false,
            trace: false,
            stats: false,
        }
    }

    fn write_log(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_parse_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(&dir, "mask_rcnn.log", LOG.as_bytes());

        let mut out = Vec::new();
        let summary = run_parse(&args(vec![path]), &TrackerConfig::default(), &mut out).unwrap();

        assert_eq!(summary.failed(), 0);
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].run_id, "mask_rcnn");

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["metrics"]["ap"], 0.387);
        assert_eq!(value["metrics"]["ap50"], 0.588);
        assert_eq!(value["metrics"]["iterations"], 19);
        assert_eq!(value["metrics"]["total_loss"], 1.873);
        assert!(value["metrics"]["ap75"].is_null());
    }

    #[test]
    fn test_parse_batch_continues_past_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_log(&dir, "good.log", LOG.as_bytes());
        let bad = write_log(&dir, "bad.log", b"\xFF\xFE\x00");
        let missing = dir.path().join("missing.log").display().to_string();

        let mut out = Vec::new();
        let summary = run_parse(&args(vec![bad, good, missing]), &TrackerConfig::default(), &mut out).unwrap();

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].run_id, "good");
        assert_eq!(summary.stats.inputs.non_utf8_inputs, 1);
        assert_eq!(summary.stats.inputs.io_errors, 1);
        assert_eq!(summary.failed(), 2);
        assert!((summary.stats.success_rate - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_respects_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(&dir, "big.log", LOG.as_bytes());

        let mut config = TrackerConfig::default();
        config.input.max_log_bytes = 16;

        let mut out = Vec::new();
        let summary = run_parse(&args(vec![path]), &config, &mut out).unwrap();
        assert!(summary.reports.is_empty());
        assert_eq!(summary.stats.inputs.inputs_too_large, 1);
    }

    #[test]
    fn test_run_id_override_and_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(&dir, "x.log", LOG.as_bytes());

        let mut parse_args = args(vec![path]);
        parse_args.run_id = Some("baseline-01".to_string());
        parse_args.fill_defaults = true;
        parse_args.trace = true;

        let mut out = Vec::new();
        run_parse(&parse_args, &TrackerConfig::default(), &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["run_id"], "baseline-01");
        assert_eq!(value["metrics"]["ap75"], 0.0);
        assert_eq!(value["metrics"]["batch_size"], 0);
        assert_eq!(value["trace"]["anchor_line"], 1);
    }

    #[test]
    fn test_run_id_rejected_for_batches() {
        let mut parse_args = args(vec!["a.log".to_string(), "b.log".to_string()]);
        parse_args.run_id = Some("one".to_string());
        let mut out = Vec::new();
        assert!(run_parse(&parse_args, &TrackerConfig::default(), &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_batch_stats_serialize_flat() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(&dir, "r50.log", LOG.as_bytes());

        let mut out = Vec::new();
        let summary = run_parse(&args(vec![path]), &TrackerConfig::default(), &mut out).unwrap();

        let value = serde_json::to_value(&summary.stats).unwrap();
        assert_eq!(value["logs_extracted"], 1);
        assert_eq!(value["logs_with_anchor"], 1);
        assert_eq!(value["io_errors"], 0);
        assert_eq!(value["success_rate"], 1.0);
    }

    #[test]
    fn test_saturating_nanos() {
        assert_eq!(saturating_nanos(Duration::from_micros(3)), 3_000);
        assert_eq!(saturating_nanos(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_print_patterns_lists_every_field() {
        let mut out = Vec::new();
        print_patterns(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.lines().count(), FIELD_PATTERNS.len() + 1);
        assert!(text.contains("ap             anchor"));
        assert!(text.contains("batch_size     window"));
        assert!(text.contains("ap50           after_anchor"));
    }
}
