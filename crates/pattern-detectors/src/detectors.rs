use chart_core::{Candle, GroundTruthItem, Part, PatternDetector, Tool, ValidationConfig};

use crate::fibonacci::detect_fibonacci_legs;
use crate::fvg::detect_fair_value_gaps;
use crate::swings::detect_swings;

#[derive(Debug, Clone)]
pub struct SwingDetector {
    pub radius: usize,
}

impl PatternDetector for SwingDetector {
    fn tool(&self) -> Tool {
        Tool::Swings
    }

    fn detect(&self, series: &[Candle]) -> Vec<GroundTruthItem> {
        detect_swings(series, self.radius)
    }
}

#[derive(Debug, Clone)]
pub struct FibonacciDetector {
    pub radius: usize,
}

impl PatternDetector for FibonacciDetector {
    fn tool(&self) -> Tool {
        Tool::Fibonacci
    }

    fn detect(&self, series: &[Candle]) -> Vec<GroundTruthItem> {
        detect_fibonacci_legs(series, self.radius)
    }
}

#[derive(Debug, Clone)]
pub struct FairValueGapDetector {
    pub count_filled_gaps: bool,
}

impl PatternDetector for FairValueGapDetector {
    fn tool(&self) -> Tool {
        Tool::Fvg
    }

    fn detect(&self, series: &[Candle]) -> Vec<GroundTruthItem> {
        detect_fair_value_gaps(series, self.count_filled_gaps)
    }
}

/// Detector for `tool`, configured from the validation tolerances
pub fn detector_for(tool: Tool, config: &ValidationConfig) -> Box<dyn PatternDetector> {
    match tool {
        Tool::Swings => Box::new(SwingDetector {
            radius: config.swing_radius,
        }),
        Tool::Fibonacci => Box::new(FibonacciDetector {
            radius: config.swing_radius,
        }),
        Tool::Fvg => Box::new(FairValueGapDetector {
            count_filled_gaps: config.count_filled_gaps,
        }),
    }
}

/// Ground truth for one tool, optionally restricted to one part
pub fn detect_ground_truth(
    tool: Tool,
    part: Option<Part>,
    series: &[Candle],
    config: &ValidationConfig,
) -> Vec<GroundTruthItem> {
    let items: Vec<GroundTruthItem> = detector_for(tool, config)
        .detect(series)
        .into_iter()
        .filter(|item| match (part, item.part()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        })
        .collect();

    tracing::debug!(
        tool = %tool,
        part = ?part,
        candles = series.len(),
        found = items.len(),
        "Ground truth detected"
    );

    items
}
