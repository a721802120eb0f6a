use async_trait::async_trait;
use crate::{Candle, ChartRequest, GroundTruthItem, Tool, TrainerError, ValidationOutcome, ValidationRequest};

/// Source of OHLC candles for an asset/timeframe
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_chart(&self, request: &ChartRequest) -> Result<Vec<Candle>, TrainerError>;
}

/// Scores a submission. Rejections are part of the outcome; `Err` means transport failure.
#[async_trait]
pub trait ValidationService: Send + Sync {
    async fn validate(&self, request: ValidationRequest) -> Result<ValidationOutcome, TrainerError>;
}

/// Pure ground-truth detector for one tool
pub trait PatternDetector: Send + Sync {
    fn tool(&self) -> Tool;
    fn detect(&self, series: &[Candle]) -> Vec<GroundTruthItem>;
}
