//! Extractor — two-pass anchor-and-window scan over a training log.
//!
//! 1. Anchor pass: the line with the maximum overall AP.
//! 2. Backward search from the anchor for the nearest `iter:` line.
//! 3. Forward scan from the anchor for the AP siblings.
//! 4. Scan of `[iter line, anchor)` for losses and hyperparameters.
//!
//! Every optional field is first-match-wins inside its own scope.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::{debug, error, trace};

use crate::ansi::strip_ansi_codes;
use crate::model::{parse_float, ExtractError, Extraction, Fill, MetricRecord, Scope};
use crate::patterns::{CompiledPattern, PatternTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorOptions {
    /// Remove ANSI escape sequences from each line before matching
    pub strip_ansi: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self { strip_ansi: true }
    }
}

/// Compiled pattern table plus options. Holds no per-call state, so one
/// instance can serve any number of logs, from any number of threads.
pub struct Extractor {
    table: PatternTable,
    options: ExtractorOptions,
}

impl Extractor {
    pub fn new(options: ExtractorOptions) -> Result<Self, ExtractError> {
        Ok(Self {
            table: PatternTable::compile()?,
            options,
        })
    }

    /// Best-checkpoint record for `text`. Never fails; anything not found
    /// is left unset and `average_precision` falls back to 0.0.
    pub fn extract(&self, text: &str) -> MetricRecord {
        self.extract_with_trace(text).into_record()
    }

    /// Same as [`Extractor::extract`], also reporting where the anchor and
    /// the loss window were found.
    pub fn extract_with_trace(&self, text: &str) -> Extraction {
        let lines: Vec<Cow<'_, str>> = split_lines(text)
            .map(|line| {
                if self.options.strip_ansi {
                    strip_ansi_codes(line)
                } else {
                    Cow::Borrowed(line)
                }
            })
            .collect();

        let mut record = MetricRecord::default();
        let mut malformed_values = 0;

        let anchor = self.find_anchor(&lines, &mut malformed_values);
        let mut window = None;

        if let Some((anchor_line, ap)) = anchor {
            record.average_precision = ap;
            debug!(anchor_line, ap, "Resolved best AP");

            malformed_values += self.scan(
                &lines[anchor_line..],
                Scope::AfterAnchor,
                &mut record,
            );

            window = self.iteration_window(&lines, anchor_line);
            match &window {
                Some(range) => {
                    debug!(start = range.start, end = range.end, "Resolved loss window");
                    malformed_values += self.scan(&lines[range.clone()], Scope::Window, &mut record);
                }
                None => debug!(anchor_line, "No iteration line before anchor; loss window empty"),
            }
        } else {
            debug!(lines = lines.len(), "No AP line found");
        }

        Extraction {
            record,
            anchor_line: anchor.map(|(line, _)| line),
            window,
            lines_scanned: lines.len(),
            malformed_values,
        }
    }

    /// First line holding the maximum AP, with that AP.
    fn find_anchor(&self, lines: &[Cow<'_, str>], malformed: &mut usize) -> Option<(usize, f64)> {
        let pattern = self.table.anchor();
        let mut best: Option<(usize, f64)> = None;

        for (index, line) in lines.iter().enumerate() {
            let Some(raw) = pattern.capture(line) else {
                continue;
            };
            let Some(value) = parse_float(raw) else {
                trace!(line = index, raw, "Malformed AP value");
                *malformed += 1;
                continue;
            };
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((index, value)),
            }
        }

        best
    }

    /// `[nearest iter line at or before anchor, anchor)`, or `None` when no
    /// such line exists.
    fn iteration_window(&self, lines: &[Cow<'_, str>], anchor_line: usize) -> Option<Range<usize>> {
        let boundary = self.table.boundary();
        (0..=anchor_line)
            .rev()
            .find(|&index| boundary.is_match(&lines[index]))
            .map(|start| start..anchor_line)
    }

    /// Forward first-match-wins fill of every field in `scope`. Returns the
    /// number of malformed captures seen.
    fn scan(&self, lines: &[Cow<'_, str>], scope: Scope, record: &mut MetricRecord) -> usize {
        let mut pending: Vec<&CompiledPattern> = self.table.in_scope(scope).collect();
        let mut malformed = 0;

        for line in lines {
            if pending.is_empty() {
                break;
            }
            pending.retain(|pattern| {
                let Some(raw) = pattern.capture(line) else {
                    return true;
                };
                match record.fill(pattern.field, raw) {
                    Fill::Filled | Fill::AlreadySet => false,
                    Fill::Malformed => {
                        trace!(field = %pattern.field, raw, "Malformed value");
                        malformed += 1;
                        true
                    }
                }
            });
        }

        malformed
    }
}

/// Lines end at `\n`, `\r\n` or a lone `\r` (progress bars rewrite in place).
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().flat_map(|line| line.split('\r'))
}

static DEFAULT_EXTRACTOR: LazyLock<Result<Extractor, ExtractError>> =
    LazyLock::new(|| Extractor::new(ExtractorOptions::default()));

/// Extract with the default options.
pub fn extract(text: &str) -> MetricRecord {
    match DEFAULT_EXTRACTOR.as_ref() {
        Ok(extractor) => extractor.extract(text),
        Err(e) => {
            error!("Default extractor unavailable: {}", e);
            MetricRecord::default()
        }
    }
}
