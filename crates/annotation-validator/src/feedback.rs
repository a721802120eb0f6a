//! Turns match verdicts into ordered, glyph-prefixed feedback lines.

use chart_core::{
    Annotation, Candle, GroundTruthItem, GroundTruthPattern, Part, Tool, ValidationConfig,
};

use crate::matcher::{MatchReport, MismatchReason};

pub const CORRECT_GLYPH: &str = "✓";
pub const INCORRECT_GLYPH: &str = "✗";
pub const WARNING_GLYPH: &str = "⚠";

#[derive(Debug, Clone)]
pub struct FeedbackComposer {
    /// Percentage at or above which the summary reads "Excellent work"
    pub excellent_threshold: u32,
    /// Percentage at or above which the summary reads "Good effort"
    pub good_threshold: u32,
}

impl Default for FeedbackComposer {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

fn time_at(series: &[Candle], index: usize) -> String {
    series
        .get(index)
        .map(|c| c.time_label())
        .unwrap_or_else(|| format!("candle {}", index))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human description of a detected item
pub fn describe_item(item: &GroundTruthItem, series: &[Candle]) -> String {
    match &item.pattern {
        GroundTruthPattern::Swing(p) => {
            format!("{} at {} ({:.2})", p.kind.label(), time_at(series, p.index), p.price)
        }
        GroundTruthPattern::FibonacciLeg(leg) => format!(
            "{} leg from {} ({:.2}) to {} ({:.2})",
            leg.direction.label(),
            time_at(series, leg.start_index),
            leg.start_price,
            time_at(series, leg.end_index),
            leg.end_price
        ),
        GroundTruthPattern::FairValueGap(gap) => {
            let mut text = format!(
                "{} fair value gap at {} ({:.2} - {:.2})",
                gap.bias.label(),
                time_at(series, gap.zone.start_index + 1),
                gap.zone.bottom_price,
                gap.zone.top_price
            );
            if let Some(filled) = gap.filled_at {
                text.push_str(&format!(", filled at {}", time_at(series, filled)));
            }
            text
        }
    }
}

/// Human description of a learner drawing
pub fn describe_annotation(ann: &Annotation, series: &[Candle]) -> String {
    let at = |ts: i64| {
        chart_core::snap_index(series, ts)
            .map(|i| time_at(series, i))
            .unwrap_or_else(|| ts.to_string())
    };
    match ann {
        Annotation::Swing(a) => format!("{} marked at {}", a.kind.label(), at(a.point.timestamp)),
        Annotation::Fibonacci(a) => format!(
            "{} leg drawn from {} to {}",
            a.direction.label(),
            at(a.start.timestamp),
            at(a.end.timestamp)
        ),
        Annotation::Fvg(a) => {
            let zone = a.zone.normalized();
            format!(
                "{} gap drawn over {} - {}",
                a.bias.label(),
                time_at(series, zone.start_index),
                time_at(series, zone.end_index)
            )
        }
    }
}

fn reason_text(reason: &MismatchReason, tool: Tool) -> String {
    match reason {
        MismatchReason::WrongKind { expected } => format!("this point is a {}", expected.label()),
        MismatchReason::DirectionReversed => "leg direction reversed".to_string(),
        MismatchReason::BiasReversed => "gap bias reversed".to_string(),
        MismatchReason::AlreadyClaimed { item_id } => format!("duplicates a mark already matched to {}", item_id),
        MismatchReason::OutOfTolerance => format!("does not match any of the expected {}", tool.item_noun()),
        MismatchReason::NoPatternExists => format!("there are no {} on this chart", tool.item_noun()),
        MismatchReason::WrongTool { tool: drawn } => {
            format!("a {} drawing cannot be scored with the {} tool", drawn, tool)
        }
    }
}

/// Composed feedback for one submission
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub message: String,
    pub lines: Vec<String>,
}

impl FeedbackComposer {
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            excellent_threshold: config.excellent_threshold,
            good_threshold: config.good_threshold,
        }
    }

    /// Summary sentence for a percentage
    pub fn summary(&self, tool: Tool, score: u32, total: u32, percentage: u32) -> String {
        let lead = if percentage >= self.excellent_threshold {
            "Excellent work!"
        } else if percentage >= self.good_threshold {
            "Good effort!"
        } else {
            "Needs improvement."
        };

        if total == 0 {
            if percentage == 100 {
                format!("{} There were no {} to find.", lead, tool.item_noun())
            } else {
                format!("{} There were no {} on this chart.", lead, tool.item_noun())
            }
        } else {
            format!("{} You found {} of {} {}.", lead, score, total, tool.item_noun())
        }
    }

    /// Correct (ground-truth order), missed (ground-truth order), incorrect
    /// (submission order), then summary warnings.
    #[allow(clippy::too_many_arguments)]
    pub fn compose(
        &self,
        tool: Tool,
        series: &[Candle],
        learner: &[Annotation],
        truth: &[GroundTruthItem],
        report: &MatchReport,
        percentage: u32,
        include_multi_part: bool,
    ) -> Feedback {
        let mut lines = Vec::new();

        for (item, claimed) in truth.iter().zip(&report.claimed_by) {
            if claimed.is_some() {
                lines.push(format!(
                    "{} {} identified correctly",
                    CORRECT_GLYPH,
                    capitalize(&describe_item(item, series))
                ));
            }
        }

        if truth.is_empty() && learner.is_empty() {
            lines.push(format!(
                "{} Correct: there are no {} on this chart",
                CORRECT_GLYPH,
                tool.item_noun()
            ));
        }

        for index in report.missed() {
            lines.push(format!(
                "{} Missed {}",
                INCORRECT_GLYPH,
                describe_item(&truth[index], series)
            ));
        }

        for (index, reason) in report.incorrect() {
            let glyph = if reason.is_near_miss() {
                WARNING_GLYPH
            } else {
                INCORRECT_GLYPH
            };
            lines.push(format!(
                "{} {}: {}",
                glyph,
                capitalize(&describe_annotation(&learner[index], series)),
                reason_text(reason, tool)
            ));
        }

        if truth.is_empty() && !learner.is_empty() {
            lines.push(format!(
                "{} No {} exist on this chart; the right answer was \"no patterns found\"",
                WARNING_GLYPH,
                tool.item_noun()
            ));
        } else if learner.len() > truth.len() {
            lines.push(format!(
                "{} You marked {} {} but only {} were expected",
                WARNING_GLYPH,
                learner.len(),
                tool.item_noun(),
                truth.len()
            ));
        }

        if include_multi_part && tool.is_multi_part() {
            for part in [Part::One, Part::Two] {
                let (found, expected) = truth
                    .iter()
                    .zip(&report.claimed_by)
                    .filter(|(item, _)| item.part() == Some(part))
                    .fold((0u32, 0u32), |(f, e), (_, c)| (f + c.is_some() as u32, e + 1));
                let glyph = if found == expected {
                    CORRECT_GLYPH
                } else {
                    WARNING_GLYPH
                };
                lines.push(format!(
                    "{} {} part: {} of {} found",
                    glyph,
                    capitalize(tool.part_label(part)),
                    found,
                    expected
                ));
            }
        }

        let message = self.summary(tool, report.score(), truth.len() as u32, percentage);

        Feedback { message, lines }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_thresholds() {
        let composer = FeedbackComposer::default();
        assert!(composer.summary(Tool::Swings, 4, 5, 80).starts_with("Excellent work!"));
        assert!(composer.summary(Tool::Swings, 3, 5, 60).starts_with("Good effort!"));
        assert!(composer.summary(Tool::Swings, 1, 5, 20).starts_with("Needs improvement."));
        assert_eq!(
            composer.summary(Tool::Fvg, 0, 0, 100),
            "Excellent work! There were no fair value gaps to find."
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let composer = FeedbackComposer {
            excellent_threshold: 95,
            good_threshold: 90,
        };
        assert!(composer.summary(Tool::Swings, 9, 10, 90).starts_with("Good effort!"));
        assert!(composer.summary(Tool::Swings, 8, 10, 80).starts_with("Needs improvement."));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("swing high"), "Swing high");
        assert_eq!(capitalize(""), "");
    }
}
