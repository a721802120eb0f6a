use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLC candle. Timestamps are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Short UTC label used in feedback text
    pub fn time_label(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| self.timestamp.to_string())
    }
}

/// A (timestamp, price) pair emitted by the drawing surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPoint {
    pub timestamp: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    pub fn label(&self) -> &'static str {
        match self {
            SwingKind::High => "swing high",
            SwingKind::Low => "swing low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegDirection {
    Up,
    Down,
}

impl LegDirection {
    pub fn label(&self) -> &'static str {
        match self {
            LegDirection::Up => "uptrend",
            LegDirection::Down => "downtrend",
        }
    }

    pub fn part(&self) -> Part {
        match self {
            LegDirection::Up => Part::One,
            LegDirection::Down => Part::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FvgBias {
    Bullish,
    Bearish,
}

impl FvgBias {
    pub fn label(&self) -> &'static str {
        match self {
            FvgBias::Bullish => "bullish",
            FvgBias::Bearish => "bearish",
        }
    }

    pub fn part(&self) -> Part {
        match self {
            FvgBias::Bullish => Part::One,
            FvgBias::Bearish => Part::Two,
        }
    }
}

/// Serialized flat: `{timestamp, price, kind}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingAnnotation {
    #[serde(flatten)]
    pub point: AnnotationPoint,
    pub kind: SwingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibonacciAnnotation {
    pub start: AnnotationPoint,
    pub end: AnnotationPoint,
    pub direction: LegDirection,
}

/// Rectangular zone anchored to candle indices and prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub start_index: usize,
    pub end_index: usize,
    pub top_price: f64,
    pub bottom_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FvgAnnotation {
    pub zone: Zone,
    pub bias: FvgBias,
}

/// Any learner drawing, tagged by shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Annotation {
    Swing(SwingAnnotation),
    Fibonacci(FibonacciAnnotation),
    Fvg(FvgAnnotation),
}

impl Annotation {
    pub fn tool(&self) -> Tool {
        match self {
            Annotation::Swing(_) => Tool::Swings,
            Annotation::Fibonacci(_) => Tool::Fibonacci,
            Annotation::Fvg(_) => Tool::Fvg,
        }
    }

    /// Part implied by the drawing's own direction/bias tag
    pub fn part(&self) -> Option<Part> {
        match self {
            Annotation::Swing(_) => None,
            Annotation::Fibonacci(f) => Some(f.direction.part()),
            Annotation::Fvg(f) => Some(f.bias.part()),
        }
    }
}

impl From<SwingAnnotation> for Annotation {
    fn from(a: SwingAnnotation) -> Self {
        Annotation::Swing(a)
    }
}

impl From<FibonacciAnnotation> for Annotation {
    fn from(a: FibonacciAnnotation) -> Self {
        Annotation::Fibonacci(a)
    }
}

impl From<FvgAnnotation> for Annotation {
    fn from(a: FvgAnnotation) -> Self {
        Annotation::Fvg(a)
    }
}

/// Drawing tool. Fibonacci and FVG carry two independent parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Swings,
    Fibonacci,
    Fvg,
}

impl Tool {
    pub fn is_multi_part(&self) -> bool {
        matches!(self, Tool::Fibonacci | Tool::Fvg)
    }

    /// Noun used when talking about ground-truth items of this tool
    pub fn item_noun(&self) -> &'static str {
        match self {
            Tool::Swings => "swing points",
            Tool::Fibonacci => "Fibonacci legs",
            Tool::Fvg => "fair value gaps",
        }
    }

    pub fn part_label(&self, part: Part) -> &'static str {
        match (self, part) {
            (Tool::Swings, _) => "swings",
            (Tool::Fibonacci, Part::One) => "uptrend",
            (Tool::Fibonacci, Part::Two) => "downtrend",
            (Tool::Fvg, Part::One) => "bullish",
            (Tool::Fvg, Part::Two) => "bearish",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tool::Swings => write!(f, "swings"),
            Tool::Fibonacci => write!(f, "fibonacci"),
            Tool::Fvg => write!(f, "fvg"),
        }
    }
}

impl std::str::FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "swings" | "swing" => Ok(Tool::Swings),
            "fibonacci" | "fib" => Ok(Tool::Fibonacci),
            "fvg" => Ok(Tool::Fvg),
            _ => Err(format!("Unknown tool: {}", s)),
        }
    }
}

/// Active part of a multi-part tool, serialized as 1 or 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Part {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for Part {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Part::One),
            2 => Ok(Part::Two),
            other => Err(format!("part must be 1 or 2, got {}", other)),
        }
    }
}

impl From<Part> for u8 {
    fn from(part: Part) -> u8 {
        match part {
            Part::One => 1,
            Part::Two => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Crypto,
    Forex,
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Stock => write!(f, "stock"),
            AssetType::Crypto => write!(f, "crypto"),
            AssetType::Forex => write!(f, "forex"),
        }
    }
}

impl std::str::FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" | "stocks" | "equity" => Ok(AssetType::Stock),
            "crypto" => Ok(AssetType::Crypto),
            "forex" | "fx" => Ok(AssetType::Forex),
            _ => Err(format!("Unknown asset type: {}", s)),
        }
    }
}

/// Chart timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[default]
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute5 => 5,
            Timeframe::Minute15 => 15,
            Timeframe::Minute30 => 30,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
            Timeframe::Day1 => 1440,
            Timeframe::Week1 => 10080,
            Timeframe::Month1 => 43200,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
            Timeframe::Month1 => "1M",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    // "1M" (month) and "1m" (minute) differ only by case, so match exactly first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1M" | "1mo" => return Ok(Timeframe::Month1),
            "1m" => return Ok(Timeframe::Minute1),
            _ => {}
        }
        match s.to_lowercase().as_str() {
            "1min" => Ok(Timeframe::Minute1),
            "5m" | "5min" => Ok(Timeframe::Minute5),
            "15m" | "15min" => Ok(Timeframe::Minute15),
            "30m" | "30min" => Ok(Timeframe::Minute30),
            "1h" | "1hour" => Ok(Timeframe::Hour1),
            "4h" | "4hour" => Ok(Timeframe::Hour4),
            "1d" | "daily" => Ok(Timeframe::Day1),
            "1w" | "weekly" => Ok(Timeframe::Week1),
            "monthly" => Ok(Timeframe::Month1),
            _ => Err(format!("Unknown timeframe: {}", s)),
        }
    }
}

/// Parameters for a market-data fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    pub asset: String,
    pub asset_type: AssetType,
    pub timeframe: Timeframe,
}

/// Fibonacci retracement ratios attached to every leg
pub const FIB_RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetracementLevel {
    pub ratio: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub timestamp: i64,
    pub price: f64,
    pub kind: SwingKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FibonacciLeg {
    pub start_index: usize,
    pub end_index: usize,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub start_price: f64,
    pub end_price: f64,
    pub direction: LegDirection,
    pub levels: Vec<RetracementLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairValueGap {
    pub zone: Zone,
    pub bias: FvgBias,
    /// First later candle whose range trades through the whole gap
    pub filled_at: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GroundTruthPattern {
    Swing(SwingPoint),
    FibonacciLeg(FibonacciLeg),
    FairValueGap(FairValueGap),
}

/// Detector output with a stable id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthItem {
    pub id: String,
    pub pattern: GroundTruthPattern,
}

impl GroundTruthItem {
    pub fn tool(&self) -> Tool {
        match self.pattern {
            GroundTruthPattern::Swing(_) => Tool::Swings,
            GroundTruthPattern::FibonacciLeg(_) => Tool::Fibonacci,
            GroundTruthPattern::FairValueGap(_) => Tool::Fvg,
        }
    }

    pub fn part(&self) -> Option<Part> {
        match &self.pattern {
            GroundTruthPattern::Swing(_) => None,
            GroundTruthPattern::FibonacciLeg(leg) => Some(leg.direction.part()),
            GroundTruthPattern::FairValueGap(gap) => Some(gap.bias.part()),
        }
    }

    /// Chart anchor for overlay markers
    pub fn anchor(&self, series: &[Candle]) -> AnnotationPoint {
        match &self.pattern {
            GroundTruthPattern::Swing(p) => AnnotationPoint {
                timestamp: p.timestamp,
                price: p.price,
            },
            GroundTruthPattern::FibonacciLeg(leg) => AnnotationPoint {
                timestamp: leg.end_timestamp,
                price: leg.end_price,
            },
            GroundTruthPattern::FairValueGap(gap) => {
                let mid = gap.zone.start_index + 1;
                AnnotationPoint {
                    timestamp: series.get(mid).map(|c| c.timestamp).unwrap_or_default(),
                    price: (gap.zone.top_price + gap.zone.bottom_price) / 2.0,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
    /// Rendered green
    Correct,
    /// Rendered yellow
    Missed,
    /// Rendered red
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayMarker {
    pub item_id: Option<String>,
    pub status: MarkerStatus,
    pub timestamp: i64,
    pub price: f64,
}

/// Scored outcome of one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub score: u32,
    pub total_expected_points: u32,
    pub percentage: u32,
    pub message: String,
    pub feedback: Vec<String>,
    pub correct_answers: Vec<GroundTruthItem>,
    #[serde(default)]
    pub markers: Vec<OverlayMarker>,
}

/// The engine's sole input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub tool: Tool,
    #[serde(default)]
    pub part: Part,
    #[serde(default)]
    pub drawings: Vec<Annotation>,
    pub series: Vec<Candle>,
    #[serde(default)]
    pub include_multi_part: bool,
    /// Learner explicitly answered "no patterns on this chart"
    #[serde(default)]
    pub no_patterns_found: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectionKind {
    EmptySubmission,
    InvalidToolState,
    InvalidSeries,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ValidationOutcome {
    Scored(ValidationResult),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn result(&self) -> Option<&ValidationResult> {
        match self {
            ValidationOutcome::Scored(r) => Some(r),
            ValidationOutcome::Rejected(_) => None,
        }
    }

    pub fn into_result(self) -> Result<ValidationResult, Rejection> {
        match self {
            ValidationOutcome::Scored(r) => Ok(r),
            ValidationOutcome::Rejected(r) => Err(r),
        }
    }
}
