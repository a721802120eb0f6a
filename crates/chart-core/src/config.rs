use serde::{Deserialize, Serialize};
use std::env;

use crate::error::TrainerError;

/// Candles on each side of a swing candidate
pub const DEFAULT_SWING_RADIUS: usize = 3;
/// Max index distance between a drawn swing and the detected one
pub const DEFAULT_SWING_INDEX_TOLERANCE: usize = 2;
/// Max index distance for each Fibonacci endpoint
pub const DEFAULT_FIB_ENDPOINT_TOLERANCE: usize = 2;
/// Minimum index-range IoU for an FVG zone to match
pub const DEFAULT_FVG_MIN_OVERLAP: f64 = 0.5;
pub const DEFAULT_COUNT_FILLED_GAPS: bool = true;
pub const DEFAULT_EXCELLENT_THRESHOLD: u32 = 80;
pub const DEFAULT_GOOD_THRESHOLD: u32 = 60;

/// Tolerances and scoring policy for the validation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub swing_radius: usize,
    pub swing_index_tolerance: usize,
    pub fib_endpoint_tolerance: usize,
    pub fvg_min_overlap: f64,
    /// Whether gaps already filled by later price action are scored
    pub count_filled_gaps: bool,
    pub excellent_threshold: u32,
    pub good_threshold: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            swing_radius: DEFAULT_SWING_RADIUS,
            swing_index_tolerance: DEFAULT_SWING_INDEX_TOLERANCE,
            fib_endpoint_tolerance: DEFAULT_FIB_ENDPOINT_TOLERANCE,
            fvg_min_overlap: DEFAULT_FVG_MIN_OVERLAP,
            count_filled_gaps: DEFAULT_COUNT_FILLED_GAPS,
            excellent_threshold: DEFAULT_EXCELLENT_THRESHOLD,
            good_threshold: DEFAULT_GOOD_THRESHOLD,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, TrainerError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TrainerError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

impl ValidationConfig {
    pub fn from_env() -> Result<Self, TrainerError> {
        let config = Self {
            swing_radius: env_or("SWING_RADIUS", DEFAULT_SWING_RADIUS)?,
            swing_index_tolerance: env_or("SWING_INDEX_TOLERANCE", DEFAULT_SWING_INDEX_TOLERANCE)?,
            fib_endpoint_tolerance: env_or("FIB_ENDPOINT_TOLERANCE", DEFAULT_FIB_ENDPOINT_TOLERANCE)?,
            fvg_min_overlap: env_or("FVG_MIN_OVERLAP", DEFAULT_FVG_MIN_OVERLAP)?,
            count_filled_gaps: env_or("COUNT_FILLED_GAPS", DEFAULT_COUNT_FILLED_GAPS)?,
            excellent_threshold: env_or("EXCELLENT_THRESHOLD", DEFAULT_EXCELLENT_THRESHOLD)?,
            good_threshold: env_or("GOOD_THRESHOLD", DEFAULT_GOOD_THRESHOLD)?,
        };
        config.validate()?;
        tracing::debug!(?config, "Validation config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrainerError> {
        if self.swing_radius == 0 {
            return Err(TrainerError::Config("swing_radius must be at least 1".to_string()));
        }
        if !(self.fvg_min_overlap > 0.0 && self.fvg_min_overlap <= 1.0) {
            return Err(TrainerError::Config(format!(
                "fvg_min_overlap must be in (0, 1], got {}",
                self.fvg_min_overlap
            )));
        }
        if self.excellent_threshold > 100 || self.good_threshold > self.excellent_threshold {
            return Err(TrainerError::Config(format!(
                "thresholds must satisfy good ({}) <= excellent ({}) <= 100",
                self.good_threshold, self.excellent_threshold
            )));
        }
        Ok(())
    }
}
