use chart_core::{
    Candle, FibonacciLeg, GroundTruthItem, GroundTruthPattern, LegDirection, RetracementLevel, SwingKind,
    SwingPoint, FIB_RATIOS,
};

use crate::swings::find_swing_points;

/// Collapse runs of same-kind swings to their most extreme member (earliest on ties),
/// leaving a strictly alternating high/low sequence.
pub fn alternating_swings(points: &[SwingPoint]) -> Vec<SwingPoint> {
    let mut out: Vec<SwingPoint> = Vec::with_capacity(points.len());

    for point in points {
        match out.last_mut() {
            Some(last) if last.kind == point.kind => {
                let more_extreme = match point.kind {
                    SwingKind::High => point.price > last.price,
                    SwingKind::Low => point.price < last.price,
                };
                if more_extreme {
                    *last = *point;
                }
            }
            _ => out.push(*point),
        }
    }

    out
}

/// Retracement prices measured back from the leg's end toward its start
pub fn retracement_levels(start_price: f64, end_price: f64) -> Vec<RetracementLevel> {
    FIB_RATIOS
        .iter()
        .map(|&ratio| RetracementLevel {
            ratio,
            price: end_price - (end_price - start_price) * ratio,
        })
        .collect()
}

/// Legs between consecutive alternating swings
pub fn find_fibonacci_legs(series: &[Candle], radius: usize) -> Vec<FibonacciLeg> {
    let swings = alternating_swings(&find_swing_points(series, radius));

    swings
        .windows(2)
        .filter_map(|pair| {
            let (start, end) = (pair[0], pair[1]);
            if start.index >= end.index {
                return None;
            }

            let direction = match (start.kind, end.kind) {
                (SwingKind::Low, SwingKind::High) if end.price > start.price => LegDirection::Up,
                (SwingKind::High, SwingKind::Low) if end.price < start.price => LegDirection::Down,
                _ => return None,
            };

            Some(FibonacciLeg {
                start_index: start.index,
                end_index: end.index,
                start_timestamp: start.timestamp,
                end_timestamp: end.timestamp,
                start_price: start.price,
                end_price: end.price,
                direction,
                levels: retracement_levels(start.price, end.price),
            })
        })
        .collect()
}

pub fn leg_id(leg: &FibonacciLeg) -> String {
    let dir = match leg.direction {
        LegDirection::Up => "up",
        LegDirection::Down => "down",
    };
    format!("fib-{}-{}-{}", dir, leg.start_index, leg.end_index)
}

/// Ground-truth Fibonacci legs
pub fn detect_fibonacci_legs(series: &[Candle], radius: usize) -> Vec<GroundTruthItem> {
    find_fibonacci_legs(series, radius)
        .into_iter()
        .map(|leg| GroundTruthItem {
            id: leg_id(&leg),
            pattern: GroundTruthPattern::FibonacciLeg(leg),
        })
        .collect()
}
