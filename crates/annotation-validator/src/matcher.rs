//! Tolerance-based greedy matching of learner drawings against ground truth.
//!
//! Learner annotations are visited in submission order; each claims the
//! nearest unclaimed ground-truth item within tolerance. Direction and bias
//! tags gate every match, so a multi-part submission re-associates itself
//! with the right part regardless of drawing order.

use chart_core::{
    Annotation, Candle, FibonacciAnnotation, FvgAnnotation, GroundTruthItem, GroundTruthPattern,
    SwingAnnotation, SwingKind, Tool, ValidationConfig,
};
use serde::Serialize;

/// Why a learner annotation did not earn a point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum MismatchReason {
    /// Close to a detected swing of the other kind
    WrongKind { expected: SwingKind },
    /// Endpoints match a leg that runs the other way
    DirectionReversed,
    /// Zone overlaps a gap of the opposite bias
    BiasReversed,
    /// Would have matched, but an earlier mark already claimed the item
    AlreadyClaimed { item_id: String },
    OutOfTolerance,
    /// The detector found nothing for this tool
    NoPatternExists,
    WrongTool { tool: Tool },
}

impl MismatchReason {
    /// Near misses are reported as warnings rather than plain errors
    pub fn is_near_miss(&self) -> bool {
        matches!(
            self,
            MismatchReason::WrongKind { .. }
                | MismatchReason::DirectionReversed
                | MismatchReason::BiasReversed
                | MismatchReason::AlreadyClaimed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "camelCase")]
pub enum LearnerVerdict {
    Correct { item: usize },
    Incorrect(MismatchReason),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    /// One verdict per learner annotation, in submission order
    pub verdicts: Vec<LearnerVerdict>,
    /// For each ground-truth item, the learner annotation that claimed it
    pub claimed_by: Vec<Option<usize>>,
}

impl MatchReport {
    pub fn score(&self) -> u32 {
        self.claimed_by.iter().filter(|c| c.is_some()).count() as u32
    }

    pub fn missed(&self) -> impl Iterator<Item = usize> + '_ {
        self.claimed_by
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i)
    }

    pub fn incorrect(&self) -> impl Iterator<Item = (usize, &MismatchReason)> + '_ {
        self.verdicts.iter().enumerate().filter_map(|(i, v)| match v {
            LearnerVerdict::Incorrect(reason) => Some((i, reason)),
            LearnerVerdict::Correct { .. } => None,
        })
    }
}

pub struct Matcher<'a> {
    series: &'a [Candle],
    config: &'a ValidationConfig,
    tool: Tool,
    /// Every detected item for the tool, used to explain misses across parts
    reference: &'a [GroundTruthItem],
}

impl<'a> Matcher<'a> {
    pub fn new(
        series: &'a [Candle],
        config: &'a ValidationConfig,
        tool: Tool,
        reference: &'a [GroundTruthItem],
    ) -> Self {
        Self {
            series,
            config,
            tool,
            reference,
        }
    }

    fn swing_distance(&self, ann: &SwingAnnotation, item: &GroundTruthItem) -> Option<usize> {
        let GroundTruthPattern::Swing(point) = &item.pattern else {
            return None;
        };
        let index = ann.point.snap(self.series)?;
        let d = index.abs_diff(point.index);
        (d <= self.config.swing_index_tolerance).then_some(d)
    }

    fn leg_distance(&self, ann: &FibonacciAnnotation, item: &GroundTruthItem, swapped: bool) -> Option<usize> {
        let GroundTruthPattern::FibonacciLeg(leg) = &item.pattern else {
            return None;
        };
        let mut start = ann.start.snap(self.series)?;
        let mut end = ann.end.snap(self.series)?;
        if swapped {
            std::mem::swap(&mut start, &mut end);
        }
        let ds = start.abs_diff(leg.start_index);
        let de = end.abs_diff(leg.end_index);
        let tol = self.config.fib_endpoint_tolerance;
        (ds <= tol && de <= tol).then_some(ds + de)
    }

    fn zone_overlap(&self, ann: &FvgAnnotation, item: &GroundTruthItem) -> Option<f64> {
        let GroundTruthPattern::FairValueGap(gap) = &item.pattern else {
            return None;
        };
        let iou = ann.zone.index_overlap(&gap.zone);
        (iou + 1e-9 >= self.config.fvg_min_overlap).then_some(iou)
    }

    /// Match distance, or None when the pair is not a match
    pub fn distance(&self, ann: &Annotation, item: &GroundTruthItem) -> Option<f64> {
        match (ann, &item.pattern) {
            (Annotation::Swing(a), GroundTruthPattern::Swing(point)) if a.kind == point.kind => {
                self.swing_distance(a, item).map(|d| d as f64)
            }
            (Annotation::Fibonacci(a), GroundTruthPattern::FibonacciLeg(leg)) if a.direction == leg.direction => {
                self.leg_distance(a, item, false).map(|d| d as f64)
            }
            (Annotation::Fvg(a), GroundTruthPattern::FairValueGap(gap)) if a.bias == gap.bias => {
                self.zone_overlap(a, item).map(|iou| 1.0 - iou)
            }
            _ => None,
        }
    }

    /// Greedy nearest-unclaimed matching in submission order
    pub fn match_annotations(&self, learner: &[Annotation], truth: &[GroundTruthItem]) -> MatchReport {
        let mut claimed_by: Vec<Option<usize>> = vec![None; truth.len()];
        let mut verdicts = Vec::with_capacity(learner.len());

        for (li, ann) in learner.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for (ti, item) in truth.iter().enumerate() {
                if claimed_by[ti].is_some() {
                    continue;
                }
                if let Some(d) = self.distance(ann, item) {
                    // strict < keeps the earliest item on ties
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((ti, d));
                    }
                }
            }

            match best {
                Some((ti, d)) => {
                    tracing::debug!(learner = li, item = %truth[ti].id, distance = d, "Annotation matched");
                    claimed_by[ti] = Some(li);
                    verdicts.push(LearnerVerdict::Correct { item: ti });
                }
                None => {
                    let reason = self.diagnose(ann, truth, &claimed_by);
                    tracing::debug!(learner = li, reason = ?reason, "Annotation unmatched");
                    verdicts.push(LearnerVerdict::Incorrect(reason));
                }
            }
        }

        MatchReport { verdicts, claimed_by }
    }

    fn diagnose(&self, ann: &Annotation, truth: &[GroundTruthItem], claimed_by: &[Option<usize>]) -> MismatchReason {
        if ann.tool() != self.tool {
            return MismatchReason::WrongTool { tool: ann.tool() };
        }
        if self.reference.is_empty() {
            return MismatchReason::NoPatternExists;
        }

        if let Some(item) = truth
            .iter()
            .zip(claimed_by)
            .find(|(item, claimed)| claimed.is_some() && self.distance(ann, item).is_some())
            .map(|(item, _)| item)
        {
            return MismatchReason::AlreadyClaimed {
                item_id: item.id.clone(),
            };
        }

        match ann {
            Annotation::Swing(a) => self
                .reference
                .iter()
                .find_map(|item| match &item.pattern {
                    GroundTruthPattern::Swing(point)
                        if point.kind != a.kind && self.swing_distance(a, item).is_some() =>
                    {
                        Some(MismatchReason::WrongKind { expected: point.kind })
                    }
                    _ => None,
                })
                .unwrap_or(MismatchReason::OutOfTolerance),
            Annotation::Fibonacci(a) => {
                let reversed = self.reference.iter().any(|item| match &item.pattern {
                    GroundTruthPattern::FibonacciLeg(leg) if leg.direction != a.direction => {
                        self.leg_distance(a, item, false).is_some() || self.leg_distance(a, item, true).is_some()
                    }
                    GroundTruthPattern::FibonacciLeg(_) => self.leg_distance(a, item, true).is_some(),
                    _ => false,
                });
                if reversed {
                    MismatchReason::DirectionReversed
                } else {
                    MismatchReason::OutOfTolerance
                }
            }
            Annotation::Fvg(a) => {
                let reversed = self.reference.iter().any(|item| match &item.pattern {
                    GroundTruthPattern::FairValueGap(gap) => gap.bias != a.bias && self.zone_overlap(a, item).is_some(),
                    _ => false,
                });
                if reversed {
                    MismatchReason::BiasReversed
                } else {
                    MismatchReason::OutOfTolerance
                }
            }
        }
    }
}
