use chart_core::{Candle, FairValueGap, FvgBias, GroundTruthItem, GroundTruthPattern, Zone};

/// Three-candle imbalances: the outer candles' wicks do not overlap.
///
/// Bullish when `c[i-1].high < c[i+1].low`, bearish when `c[i-1].low > c[i+1].high`.
/// `filled_at` records the first candle after the pattern that trades through
/// the whole gap; it does not remove the gap.
pub fn find_fair_value_gaps(series: &[Candle]) -> Vec<FairValueGap> {
    let mut gaps = Vec::new();

    if series.len() < 3 {
        return gaps;
    }

    for i in 1..series.len() - 1 {
        let prev = &series[i - 1];
        let next = &series[i + 1];
        let later = &series[i + 2..];

        if prev.high < next.low {
            let bottom = prev.high;
            gaps.push(FairValueGap {
                zone: Zone {
                    start_index: i - 1,
                    end_index: i + 1,
                    top_price: next.low,
                    bottom_price: bottom,
                },
                bias: FvgBias::Bullish,
                filled_at: later.iter().position(|c| c.low <= bottom).map(|p| p + i + 2),
            });
        }

        if prev.low > next.high {
            let top = prev.low;
            gaps.push(FairValueGap {
                zone: Zone {
                    start_index: i - 1,
                    end_index: i + 1,
                    top_price: top,
                    bottom_price: next.high,
                },
                bias: FvgBias::Bearish,
                filled_at: later.iter().position(|c| c.high >= top).map(|p| p + i + 2),
            });
        }
    }

    gaps
}

pub fn gap_id(gap: &FairValueGap) -> String {
    format!("fvg-{}-{}", gap.bias.label(), gap.zone.start_index + 1)
}

/// Ground-truth gaps; filled gaps are dropped unless `count_filled_gaps` is set
pub fn detect_fair_value_gaps(series: &[Candle], count_filled_gaps: bool) -> Vec<GroundTruthItem> {
    find_fair_value_gaps(series)
        .into_iter()
        .filter(|gap| count_filled_gaps || gap.filled_at.is_none())
        .map(|gap| GroundTruthItem {
            id: gap_id(&gap),
            pattern: GroundTruthPattern::FairValueGap(gap),
        })
        .collect()
}
