use async_trait::async_trait;
use chart_core::{
    validate_series, Annotation, Candle, GroundTruthItem, MarkerStatus, OverlayMarker, Part, Rejection,
    RejectionKind, TrainerError, ValidationConfig, ValidationOutcome, ValidationRequest, ValidationResult,
    ValidationService,
};
use pattern_detectors::detect_ground_truth;

use crate::feedback::FeedbackComposer;
use crate::matcher::{MatchReport, Matcher};

/// Stateless scorer behind the `Validate` contract.
///
/// Every request carries its own series and drawings, so one engine can be
/// shared across sessions and threads.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    config: ValidationConfig,
    composer: FeedbackComposer,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn percentage(score: u32, total: u32, submitted: usize) -> u32 {
    if total == 0 {
        return if submitted == 0 { 100 } else { 0 };
    }
    ((score as f64 * 100.0) / total as f64).round() as u32
}

fn learner_anchor(ann: &Annotation, series: &[Candle]) -> (i64, f64) {
    match ann {
        Annotation::Swing(a) => (a.point.timestamp, a.point.price),
        Annotation::Fibonacci(a) => (a.end.timestamp, a.end.price),
        Annotation::Fvg(a) => {
            let zone = a.zone.normalized();
            let mid = zone.start_index + (zone.end_index - zone.start_index) / 2;
            let ts = series.get(mid).map(|c| c.timestamp).unwrap_or_default();
            (ts, (zone.top_price + zone.bottom_price) / 2.0)
        }
    }
}

fn markers(
    series: &[Candle],
    learner: &[Annotation],
    truth: &[GroundTruthItem],
    report: &MatchReport,
) -> Vec<OverlayMarker> {
    let mut out: Vec<OverlayMarker> = truth
        .iter()
        .zip(&report.claimed_by)
        .map(|(item, claimed)| {
            let anchor = item.anchor(series);
            OverlayMarker {
                item_id: Some(item.id.clone()),
                status: if claimed.is_some() {
                    MarkerStatus::Correct
                } else {
                    MarkerStatus::Missed
                },
                timestamp: anchor.timestamp,
                price: anchor.price,
            }
        })
        .collect();

    out.extend(report.incorrect().map(|(index, _)| {
        let (timestamp, price) = learner_anchor(&learner[index], series);
        OverlayMarker {
            item_id: None,
            status: MarkerStatus::Incorrect,
            timestamp,
            price,
        }
    }));

    out
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Self {
        let composer = FeedbackComposer::from_config(&config);
        Self { config, composer }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Score a submission. Contract violations come back as `Rejected`, never as a panic or `Err`.
    pub fn validate(&self, request: &ValidationRequest) -> ValidationOutcome {
        match self.score(request) {
            Ok(result) => {
                tracing::info!(
                    tool = %request.tool,
                    score = result.score,
                    total = result.total_expected_points,
                    percentage = result.percentage,
                    "Submission scored"
                );
                ValidationOutcome::Scored(result)
            }
            Err(err) => {
                let kind = match err {
                    TrainerError::EmptySubmission(_) => RejectionKind::EmptySubmission,
                    TrainerError::InvalidSeries(_) => RejectionKind::InvalidSeries,
                    _ => RejectionKind::InvalidToolState,
                };
                tracing::warn!(tool = %request.tool, error = %err, "Submission rejected");
                ValidationOutcome::Rejected(Rejection {
                    kind,
                    message: err.to_string(),
                })
            }
        }
    }

    /// Parts whose ground truth is in scope for this request
    fn scoring_parts(request: &ValidationRequest) -> Option<Vec<Part>> {
        if !request.tool.is_multi_part() {
            None
        } else if request.include_multi_part {
            Some(vec![Part::One, Part::Two])
        } else {
            Some(vec![request.part])
        }
    }

    fn score(&self, request: &ValidationRequest) -> Result<ValidationResult, TrainerError> {
        let tool = request.tool;
        let series = request.series.as_slice();

        validate_series(series).map_err(|e| match e {
            TrainerError::InvalidSeries(msg) if series.is_empty() => {
                TrainerError::InvalidToolState(format!("no chart is loaded for {} ({})", tool, msg))
            }
            other => other,
        })?;

        if !tool.is_multi_part() && request.part == Part::Two {
            return Err(TrainerError::InvalidToolState(format!(
                "the {} tool has no second part",
                tool
            )));
        }

        if request.drawings.is_empty() && !request.no_patterns_found {
            return Err(TrainerError::EmptySubmission(format!(
                "draw at least one annotation with the {} tool, or submit \"no patterns found\"",
                tool
            )));
        }
        if let Some(zone) = request.drawings.iter().find_map(|d| match d {
            Annotation::Fvg(a) if a.zone.start_index.max(a.zone.end_index) >= series.len() => Some(a.zone),
            _ => None,
        }) {
            return Err(TrainerError::InvalidToolState(format!(
                "zone {}..={} is outside the {}-candle chart",
                zone.start_index,
                zone.end_index,
                series.len()
            )));
        }
        if !request.drawings.is_empty() && request.no_patterns_found {
            tracing::debug!("Drawings present; ignoring the no-patterns flag");
        }

        let reference = detect_ground_truth(tool, None, series, &self.config);
        let truth: Vec<GroundTruthItem> = match Self::scoring_parts(request) {
            None => reference.clone(),
            Some(parts) => reference
                .iter()
                .filter(|item| item.part().map_or(false, |p| parts.contains(&p)))
                .cloned()
                .collect(),
        };

        let matcher = Matcher::new(series, &self.config, tool, &reference);
        let report = matcher.match_annotations(&request.drawings, &truth);

        let score = report.score();
        let total = truth.len() as u32;
        let percentage = percentage(score, total, request.drawings.len());

        let feedback = self.composer.compose(
            tool,
            series,
            &request.drawings,
            &truth,
            &report,
            percentage,
            request.include_multi_part,
        );
        let markers = markers(series, &request.drawings, &truth, &report);

        Ok(ValidationResult {
            score,
            total_expected_points: total,
            percentage,
            message: feedback.message,
            feedback: feedback.lines,
            correct_answers: truth,
            markers,
        })
    }
}

#[async_trait]
impl ValidationService for ValidationEngine {
    async fn validate(&self, request: ValidationRequest) -> Result<ValidationOutcome, TrainerError> {
        Ok(ValidationEngine::validate(self, &request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{CORRECT_GLYPH, INCORRECT_GLYPH, WARNING_GLYPH};
    use chart_core::{
        AnnotationPoint, FibonacciAnnotation, FvgAnnotation, FvgBias, GroundTruthPattern, LegDirection,
        SwingAnnotation, SwingKind, Tool,
    };

    fn candles(ranges: &[(f64, f64)]) -> Vec<Candle> {
        ranges
            .iter()
            .enumerate()
            .map(|(i, &(high, low))| Candle {
                timestamp: 1_700_000_000 + i as i64 * 3600,
                open: low,
                high,
                low,
                close: high,
            })
            .collect()
    }

    // Highs at 3 and 8 and a low at 6 for radius 2
    fn zigzag() -> Vec<Candle> {
        let highs = [1.0, 2.0, 3.0, 5.0, 3.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0];
        let ranges: Vec<(f64, f64)> = highs.iter().map(|&h| (h, h - 1.0)).collect();
        candles(&ranges)
    }

    // One bullish gap (middle 1) and one bearish gap (middle 5)
    fn gappy() -> Vec<Candle> {
        candles(&[
            (10.0, 9.0),
            (13.0, 9.5),
            (14.0, 11.0),
            (14.5, 13.0),
            (14.2, 13.5),
            (13.8, 10.0),
            (12.0, 11.0),
            (12.5, 11.2),
        ])
    }

    // Monotonic, overlapping candles: no swings, no gaps
    fn flat() -> Vec<Candle> {
        candles(&vec![(10.0, 9.0); 12])
    }

    fn engine() -> ValidationEngine {
        ValidationEngine::new(ValidationConfig {
            swing_radius: 2,
            ..Default::default()
        })
    }

    fn to_annotation(item: &GroundTruthItem) -> Annotation {
        match &item.pattern {
            GroundTruthPattern::Swing(p) => Annotation::Swing(SwingAnnotation {
                point: AnnotationPoint {
                    timestamp: p.timestamp,
                    price: p.price,
                },
                kind: p.kind,
            }),
            GroundTruthPattern::FibonacciLeg(leg) => Annotation::Fibonacci(FibonacciAnnotation {
                start: AnnotationPoint {
                    timestamp: leg.start_timestamp,
                    price: leg.start_price,
                },
                end: AnnotationPoint {
                    timestamp: leg.end_timestamp,
                    price: leg.end_price,
                },
                direction: leg.direction,
            }),
            GroundTruthPattern::FairValueGap(gap) => Annotation::Fvg(FvgAnnotation {
                zone: gap.zone,
                bias: gap.bias,
            }),
        }
    }

    fn request(tool: Tool, series: Vec<Candle>, drawings: Vec<Annotation>) -> ValidationRequest {
        ValidationRequest {
            tool,
            part: Part::One,
            drawings,
            series,
            include_multi_part: tool.is_multi_part(),
            no_patterns_found: false,
        }
    }

    fn scored(outcome: ValidationOutcome) -> ValidationResult {
        match outcome {
            ValidationOutcome::Scored(r) => r,
            ValidationOutcome::Rejected(r) => panic!("unexpected rejection: {:?}", r),
        }
    }

    #[test]
    fn test_submitting_ground_truth_scores_100() {
        let engine = engine();
        for (tool, series) in [
            (Tool::Swings, zigzag()),
            (Tool::Fibonacci, zigzag()),
            (Tool::Fvg, gappy()),
        ] {
            let truth = detect_ground_truth(tool, None, &series, engine.config());
            assert!(!truth.is_empty(), "{} fixture should have ground truth", tool);
            let drawings = truth.iter().map(to_annotation).collect();
            let result = scored(engine.validate(&request(tool, series, drawings)));

            assert_eq!(result.percentage, 100, "{}", tool);
            assert_eq!(result.score, result.total_expected_points);
            assert!(result
                .feedback
                .iter()
                .all(|line| !line.starts_with(INCORRECT_GLYPH) && !line.starts_with(WARNING_GLYPH)));
            assert!(result.message.starts_with("Excellent work!"));
        }
    }

    #[test]
    fn test_multi_part_reassociates_by_tag_not_order() {
        let engine = engine();
        let series = gappy();
        let truth = detect_ground_truth(Tool::Fvg, None, &series, engine.config());
        // bearish drawn first, bullish second
        let drawings: Vec<Annotation> = truth.iter().rev().map(to_annotation).collect();
        let result = scored(engine.validate(&request(Tool::Fvg, series, drawings)));
        assert_eq!(result.score, 2);
        assert_eq!(result.percentage, 100);
        assert!(result.feedback.iter().any(|l| l.contains("Bullish part: 1 of 1 found")));
        assert!(result.feedback.iter().any(|l| l.contains("Bearish part: 1 of 1 found")));
    }

    #[test]
    fn test_single_part_scope() {
        let engine = engine();
        let series = gappy();
        let truth = detect_ground_truth(Tool::Fvg, Some(Part::Two), &series, engine.config());
        let mut req = request(Tool::Fvg, series, truth.iter().map(to_annotation).collect());
        req.include_multi_part = false;
        req.part = Part::Two;
        let result = scored(engine.validate(&req));
        assert_eq!(result.total_expected_points, 1);
        assert_eq!(result.percentage, 100);
        assert!(result.correct_answers.iter().all(|i| i.part() == Some(Part::Two)));
    }

    #[test]
    fn test_empty_submission_is_rejected() {
        let engine = engine();
        let outcome = engine.validate(&request(Tool::Swings, zigzag(), Vec::new()));
        match outcome {
            ValidationOutcome::Rejected(r) => assert_eq!(r.kind, RejectionKind::EmptySubmission),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_no_patterns_answer_when_patterns_exist_scores_zero() {
        let engine = engine();
        let mut req = request(Tool::Swings, zigzag(), Vec::new());
        req.no_patterns_found = true;
        let result = scored(engine.validate(&req));
        assert_eq!(result.percentage, 0);
        assert_eq!(result.total_expected_points, 3);
        let missed = result
            .feedback
            .iter()
            .filter(|l| l.starts_with(&format!("{} Missed", INCORRECT_GLYPH)))
            .count();
        assert_eq!(missed, 3);
    }

    #[test]
    fn test_no_patterns_answer_on_flat_series_scores_100() {
        let engine = engine();
        let mut req = request(Tool::Fvg, flat(), Vec::new());
        req.no_patterns_found = true;
        let result = scored(engine.validate(&req));
        assert_eq!(result.total_expected_points, 0);
        assert_eq!(result.percentage, 100);
        assert!(result.feedback[0].starts_with(CORRECT_GLYPH));
    }

    #[test]
    fn test_drawings_on_patternless_chart_score_zero() {
        let engine = engine();
        let drawing = Annotation::Swing(SwingAnnotation {
            point: AnnotationPoint {
                timestamp: flat()[5].timestamp,
                price: 10.0,
            },
            kind: SwingKind::High,
        });
        let result = scored(engine.validate(&request(Tool::Swings, flat(), vec![drawing])));
        assert_eq!(result.percentage, 0);
        assert!(result.feedback.iter().any(|l| l.contains("no patterns found")));
        assert_eq!(result.markers.len(), 1);
        assert_eq!(result.markers[0].status, MarkerStatus::Incorrect);
    }

    #[test]
    fn test_partial_score_and_ordering() {
        let engine = engine();
        let series = zigzag();
        let truth = detect_ground_truth(Tool::Swings, None, &series, engine.config());
        let wrong = Annotation::Swing(SwingAnnotation {
            point: AnnotationPoint {
                timestamp: series[0].timestamp,
                price: 1.0,
            },
            kind: SwingKind::High,
        });
        let drawings = vec![wrong, to_annotation(&truth[2]), to_annotation(&truth[0])];
        let result = scored(engine.validate(&request(Tool::Swings, series, drawings)));

        assert_eq!(result.score, 2);
        assert_eq!(result.total_expected_points, 3);
        assert_eq!(result.percentage, 67);
        assert!(result.message.starts_with("Good effort!"));

        let glyphs: Vec<&str> = result
            .feedback
            .iter()
            .map(|l| l.split(' ').next().unwrap_or_default())
            .collect();
        assert_eq!(glyphs, vec![CORRECT_GLYPH, CORRECT_GLYPH, INCORRECT_GLYPH, INCORRECT_GLYPH]);
        assert!(result.feedback[0].contains("Swing high"));
        assert!(result.feedback[2].contains("Missed swing low"));
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let engine = engine();
        let series = zigzag();
        let truth = detect_ground_truth(Tool::Fibonacci, None, &series, engine.config());
        let req = request(Tool::Fibonacci, series, vec![to_annotation(&truth[0])]);
        assert_eq!(engine.validate(&req), engine.validate(&req));
    }

    #[test]
    fn test_reversed_leg_gets_warning() {
        let engine = engine();
        let series = zigzag();
        let leg = Annotation::Fibonacci(FibonacciAnnotation {
            start: AnnotationPoint {
                timestamp: series[6].timestamp,
                price: 0.0,
            },
            end: AnnotationPoint {
                timestamp: series[8].timestamp,
                price: 4.0,
            },
            direction: LegDirection::Down,
        });
        let mut req = request(Tool::Fibonacci, series, vec![leg]);
        req.include_multi_part = false;
        req.part = Part::Two;
        let result = scored(engine.validate(&req));
        assert!(result
            .feedback
            .iter()
            .any(|l| l.starts_with(WARNING_GLYPH) && l.contains("leg direction reversed")));
    }

    #[test]
    fn test_contract_violations_are_rejected() {
        let engine = engine();
        let drawing = Annotation::Fvg(FvgAnnotation {
            zone: chart_core::Zone {
                start_index: 0,
                end_index: 2,
                top_price: 1.0,
                bottom_price: 0.0,
            },
            bias: FvgBias::Bullish,
        });

        let outcome = engine.validate(&request(Tool::Fvg, Vec::new(), vec![drawing]));
        assert!(matches!(
            outcome,
            ValidationOutcome::Rejected(Rejection {
                kind: RejectionKind::InvalidToolState,
                ..
            })
        ));

        let mut req = request(Tool::Swings, zigzag(), vec![drawing]);
        req.part = Part::Two;
        assert!(matches!(
            engine.validate(&req),
            ValidationOutcome::Rejected(Rejection {
                kind: RejectionKind::InvalidToolState,
                ..
            })
        ));

        let mut unordered = zigzag();
        unordered.swap(1, 2);
        assert!(matches!(
            engine.validate(&request(Tool::Fvg, unordered, vec![drawing])),
            ValidationOutcome::Rejected(Rejection {
                kind: RejectionKind::InvalidSeries,
                ..
            })
        ));
    }

    #[test]
    fn test_zone_outside_chart_is_rejected() {
        let engine = engine();
        let series = gappy();
        for (start_index, end_index) in [(0, usize::MAX), (usize::MAX, usize::MAX), (2, series.len())] {
            let drawing = Annotation::Fvg(FvgAnnotation {
                zone: chart_core::Zone {
                    start_index,
                    end_index,
                    top_price: 11.0,
                    bottom_price: 10.0,
                },
                bias: FvgBias::Bullish,
            });
            let outcome = engine.validate(&request(Tool::Fvg, series.clone(), vec![drawing]));
            assert!(
                matches!(
                    outcome,
                    ValidationOutcome::Rejected(Rejection {
                        kind: RejectionKind::InvalidToolState,
                        ..
                    })
                ),
                "{}..={} should be rejected",
                start_index,
                end_index
            );
        }
    }

    #[tokio::test]
    async fn test_service_trait_wraps_engine() {
        let engine = engine();
        let service: &dyn ValidationService = &engine;
        let series = zigzag();
        let truth = detect_ground_truth(Tool::Swings, None, &series, engine.config());
        let req = request(Tool::Swings, series, truth.iter().map(to_annotation).collect());
        let outcome = service.validate(req).await.unwrap();
        assert_eq!(outcome.result().map(|r| r.percentage), Some(100));
    }
}
