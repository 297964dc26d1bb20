//! Patterns — the declarative field table and its compiled form.
//!
//! Every record field has exactly one textual shape and one scope. The
//! extractor never matches a field outside the scope listed here.

use grep_matcher::{Captures, Matcher};
use grep_regex::{RegexMatcher, RegexMatcherBuilder};

use crate::model::{ExtractError, Field, Scope};

/// One row of the field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldPattern {
    pub field: Field,
    pub scope: Scope,
    /// Regex with the numeric value in capture group 1
    pub source: &'static str,
}

/// COCO evaluation summary lines and detectron-style training step lines.
///
/// AP values are unsigned: pycocotools prints `-1.000` when a category has
/// nothing to score, and that must never pass for a precision.
///
/// Labels on training lines are anchored at a word boundary so config dumps
/// (`max_iter: 90000`, `base_lr: 0.02`) do not pass for step metrics.
pub const FIELD_PATTERNS: &[FieldPattern] = &[
    FieldPattern {
        field: Field::AveragePrecision,
        scope: Scope::Anchor,
        source: r"Average Precision\s*\(AP\)\s*@\[\s*IoU=0\.50:0\.95\s*\|\s*area=\s*all\s*\|\s*maxDets=100\s*\]\s*=\s*([0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::Ap50,
        scope: Scope::AfterAnchor,
        source: r"Average Precision\s*\(AP\)\s*@\[\s*IoU=0\.50\s*\|\s*area=\s*all\s*\|\s*maxDets=100\s*\]\s*=\s*([0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::Ap75,
        scope: Scope::AfterAnchor,
        source: r"Average Precision\s*\(AP\)\s*@\[\s*IoU=0\.75\s*\|\s*area=\s*all\s*\|\s*maxDets=100\s*\]\s*=\s*([0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::ApSmall,
        scope: Scope::AfterAnchor,
        source: r"Average Precision\s*\(AP\)\s*@\[\s*IoU=0\.50:0\.95\s*\|\s*area=\s*small\s*\|\s*maxDets=100\s*\]\s*=\s*([0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::ApMedium,
        scope: Scope::AfterAnchor,
        source: r"Average Precision\s*\(AP\)\s*@\[\s*IoU=0\.50:0\.95\s*\|\s*area=\s*medium\s*\|\s*maxDets=100\s*\]\s*=\s*([0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::ApLarge,
        scope: Scope::AfterAnchor,
        source: r"Average Precision\s*\(AP\)\s*@\[\s*IoU=0\.50:0\.95\s*\|\s*area=\s*large\s*\|\s*maxDets=100\s*\]\s*=\s*([0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::TotalLoss,
        scope: Scope::Window,
        source: r"\btotal_loss:\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::ClassificationLoss,
        scope: Scope::Window,
        source: r"\bloss_cls:\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::BoxRegressionLoss,
        scope: Scope::Window,
        source: r"\bloss_box_reg:\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::RpnClassificationLoss,
        scope: Scope::Window,
        source: r"\bloss_rpn_cls:\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::RpnLocalizationLoss,
        scope: Scope::Window,
        source: r"\bloss_rpn_loc:\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::Iterations,
        scope: Scope::Window,
        source: r"\biter:\s*([0-9]+)",
    },
    FieldPattern {
        field: Field::LearningRate,
        scope: Scope::Window,
        source: r"\blr:\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)",
    },
    FieldPattern {
        field: Field::BatchSize,
        scope: Scope::Window,
        source: r"\bbatch_size\s*=\s*([0-9]+)",
    },
];

/// A table row with its compiled matcher.
pub struct CompiledPattern {
    pub field: Field,
    pub scope: Scope,
    matcher: RegexMatcher,
}

impl CompiledPattern {
    fn compile(pattern: &FieldPattern) -> Result<Self, ExtractError> {
        let matcher = RegexMatcherBuilder::new()
            .case_insensitive(false)
            .multi_line(false)
            .build(pattern.source)
            .map_err(|e| ExtractError::InvalidPattern {
                field: pattern.field,
                reason: e.to_string(),
            })?;

        Ok(Self {
            field: pattern.field,
            scope: pattern.scope,
            matcher,
        })
    }

    #[inline]
    pub fn is_match(&self, line: &str) -> bool {
        self.matcher.is_match(line.as_bytes()).unwrap_or(false)
    }

    /// Raw text of the value group, if the line matches.
    pub fn capture<'a>(&self, line: &'a str) -> Option<&'a str> {
        let mut caps = self.matcher.new_captures().ok()?;
        if !self.matcher.captures(line.as_bytes(), &mut caps).ok()? {
            return None;
        }
        let value = caps.get(1)?;
        line.get(value.start()..value.end())
    }
}

/// The whole field table, compiled once per [`crate::Extractor`].
pub struct PatternTable {
    patterns: Vec<CompiledPattern>,
    anchor: usize,
    boundary: usize,
}

impl PatternTable {
    pub fn compile() -> Result<Self, ExtractError> {
        let patterns = FIELD_PATTERNS
            .iter()
            .map(CompiledPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let anchor = position_of(&patterns, Field::AveragePrecision)?;
        let boundary = position_of(&patterns, Field::Iterations)?;

        Ok(Self { patterns, anchor, boundary })
    }

    /// The overall-AP pattern
    pub fn anchor(&self) -> &CompiledPattern {
        &self.patterns[self.anchor]
    }

    /// The step-count pattern delimiting the loss window
    pub fn boundary(&self) -> &CompiledPattern {
        &self.patterns[self.boundary]
    }

    pub fn in_scope(&self, scope: Scope) -> impl Iterator<Item = &CompiledPattern> {
        self.patterns.iter().filter(move |p| p.scope == scope)
    }
}

fn position_of(patterns: &[CompiledPattern], field: Field) -> Result<usize, ExtractError> {
    patterns
        .iter()
        .position(|p| p.field == field)
        .ok_or_else(|| ExtractError::InvalidPattern {
            field,
            reason: "missing from field table".to_string(),
        })
}
