use chart_core::{Candle, GroundTruthItem, GroundTruthPattern, SwingKind, SwingPoint};

fn extreme(candle: &Candle, kind: SwingKind) -> f64 {
    match kind {
        SwingKind::High => candle.high,
        SwingKind::Low => candle.low,
    }
}

/// Window extreme that also strictly beats at least one neighbour on each side
fn is_swing(series: &[Candle], i: usize, radius: usize, kind: SwingKind) -> bool {
    let value = extreme(&series[i], kind);
    let at_least = |other: f64| match kind {
        SwingKind::High => other <= value,
        SwingKind::Low => other >= value,
    };
    let beaten = |other: f64| match kind {
        SwingKind::High => other < value,
        SwingKind::Low => other > value,
    };

    let window = &series[i - radius..=i + radius];
    if !window.iter().all(|c| at_least(extreme(c, kind))) {
        return false;
    }

    let left = &series[i - radius..i];
    let right = &series[i + 1..=i + radius];
    left.iter().any(|c| beaten(extreme(c, kind))) && right.iter().any(|c| beaten(extreme(c, kind)))
}

/// Find swing highs and lows with a symmetric window of `radius` candles.
///
/// Candles closer than `radius` to either end of the series are never
/// evaluated. Equal extremes within one radius of each other (plateaus)
/// keep only the earliest index. Output is ordered by index, highs before
/// lows on the same candle.
pub fn find_swing_points(series: &[Candle], radius: usize) -> Vec<SwingPoint> {
    let mut points = Vec::new();

    if radius == 0 || series.len() < 2 * radius + 1 {
        return points;
    }

    // Last kept point per kind, for plateau suppression
    let mut last_high: Option<(usize, f64)> = None;
    let mut last_low: Option<(usize, f64)> = None;

    for i in radius..series.len() - radius {
        for kind in [SwingKind::High, SwingKind::Low] {
            if !is_swing(series, i, radius, kind) {
                continue;
            }

            let price = extreme(&series[i], kind);
            let last = match kind {
                SwingKind::High => &mut last_high,
                SwingKind::Low => &mut last_low,
            };

            if let Some((prev_index, prev_price)) = *last {
                if i - prev_index <= radius && (prev_price - price).abs() < f64::EPSILON {
                    continue;
                }
            }

            *last = Some((i, price));
            points.push(SwingPoint {
                index: i,
                timestamp: series[i].timestamp,
                price,
                kind,
            });
        }
    }

    points
}

pub fn swing_id(point: &SwingPoint) -> String {
    match point.kind {
        SwingKind::High => format!("swing-high-{}", point.index),
        SwingKind::Low => format!("swing-low-{}", point.index),
    }
}

/// Ground-truth swing points
pub fn detect_swings(series: &[Candle], radius: usize) -> Vec<GroundTruthItem> {
    find_swing_points(series, radius)
        .into_iter()
        .map(|point| GroundTruthItem {
            id: swing_id(&point),
            pattern: GroundTruthPattern::Swing(point),
        })
        .collect()
}
