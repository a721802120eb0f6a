//! Geometry helpers that tie drawn shapes back to candle indices.

use crate::error::TrainerError;
use crate::types::{AnnotationPoint, Candle, Zone};

/// Index of the candle nearest to `timestamp`. Ties go to the earlier index.
pub fn snap_index(series: &[Candle], timestamp: i64) -> Option<usize> {
    if series.is_empty() {
        return None;
    }

    let p = series.partition_point(|c| c.timestamp < timestamp);
    if p == 0 {
        return Some(0);
    }
    if p == series.len() {
        return Some(series.len() - 1);
    }

    let left = timestamp.abs_diff(series[p - 1].timestamp);
    let right = series[p].timestamp.abs_diff(timestamp);
    if left <= right {
        Some(p - 1)
    } else {
        Some(p)
    }
}

impl AnnotationPoint {
    pub fn snap(&self, series: &[Candle]) -> Option<usize> {
        snap_index(series, self.timestamp)
    }
}

impl Zone {
    /// Same zone with start <= end and top >= bottom
    pub fn normalized(&self) -> Zone {
        Zone {
            start_index: self.start_index.min(self.end_index),
            end_index: self.start_index.max(self.end_index),
            top_price: self.top_price.max(self.bottom_price),
            bottom_price: self.top_price.min(self.bottom_price),
        }
    }

    /// Number of candles covered (inclusive range)
    pub fn span(&self) -> usize {
        let z = self.normalized();
        (z.end_index - z.start_index).saturating_add(1)
    }

    /// Intersection-over-union of the two inclusive index ranges (0.0 to 1.0)
    pub fn index_overlap(&self, other: &Zone) -> f64 {
        let a = self.normalized();
        let b = other.normalized();

        let lo = a.start_index.max(b.start_index);
        let hi = a.end_index.min(b.end_index);
        if lo > hi {
            return 0.0;
        }

        let intersection = (hi - lo) as f64 + 1.0;
        let union = a.span() as f64 + b.span() as f64 - intersection;
        intersection / union
    }
}

/// Series must be non-empty and strictly increasing in timestamp
pub fn validate_series(series: &[Candle]) -> Result<(), TrainerError> {
    if series.is_empty() {
        return Err(TrainerError::InvalidSeries("series is empty".to_string()));
    }

    if let Some(pos) = series
        .windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
    {
        return Err(TrainerError::InvalidSeries(format!(
            "timestamps must strictly increase (index {} -> {})",
            pos,
            pos + 1
        )));
    }

    Ok(())
}
