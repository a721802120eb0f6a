//! Session state owned by one learner.

use chart_core::{
    Annotation, AssetType, Candle, ChartRequest, FibonacciAnnotation, FvgAnnotation, Part, SwingAnnotation,
    Timeframe, Tool, ValidationResult,
};
use serde::{Deserialize, Serialize};

/// Monotonic id stamped on every fetch/validate command
pub type RequestToken = u64;

/// Where the learner is in the practice loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    AssetSelected,
    ChartLoading,
    ChartReady,
    Drawing,
    Validating,
    ResultsShown,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::AssetSelected => write!(f, "asset_selected"),
            SessionPhase::ChartLoading => write!(f, "chart_loading"),
            SessionPhase::ChartReady => write!(f, "chart_ready"),
            SessionPhase::Drawing => write!(f, "drawing"),
            SessionPhase::Validating => write!(f, "validating"),
            SessionPhase::ResultsShown => write!(f, "results_shown"),
        }
    }
}

/// Two independent drawing sets of a multi-part tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartBuckets<T> {
    pub part1: Vec<T>,
    pub part2: Vec<T>,
}

impl<T> Default for PartBuckets<T> {
    fn default() -> Self {
        Self {
            part1: Vec::new(),
            part2: Vec::new(),
        }
    }
}

impl<T: Clone> PartBuckets<T> {
    pub fn get(&self, part: Part) -> &[T] {
        match part {
            Part::One => &self.part1,
            Part::Two => &self.part2,
        }
    }

    pub fn get_mut(&mut self, part: Part) -> &mut Vec<T> {
        match part {
            Part::One => &mut self.part1,
            Part::Two => &mut self.part2,
        }
    }

    pub fn len(&self) -> usize {
        self.part1.len() + self.part2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.part1.clear();
        self.part2.clear();
    }

    /// Part 1 followed by part 2
    pub fn combined(&self) -> impl Iterator<Item = &T> + '_ {
        self.part1.iter().chain(self.part2.iter())
    }
}

/// Per-tool working sets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawingsState {
    pub swings: Vec<SwingAnnotation>,
    pub fibonacci: PartBuckets<FibonacciAnnotation>,
    pub fvg: PartBuckets<FvgAnnotation>,
}

impl DrawingsState {
    /// Combined annotation count for a tool, both parts included
    pub fn count(&self, tool: Tool) -> usize {
        match tool {
            Tool::Swings => self.swings.len(),
            Tool::Fibonacci => self.fibonacci.len(),
            Tool::Fvg => self.fvg.len(),
        }
    }

    pub fn count_part(&self, tool: Tool, part: Part) -> usize {
        match tool {
            Tool::Swings => self.swings.len(),
            Tool::Fibonacci => self.fibonacci.get(part).len(),
            Tool::Fvg => self.fvg.get(part).len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.swings.is_empty() && self.fibonacci.is_empty() && self.fvg.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.swings.clear();
        self.fibonacci.clear();
        self.fvg.clear();
    }

    /// Empty a single bucket; swings ignore the part
    pub fn clear_bucket(&mut self, tool: Tool, part: Part) {
        match tool {
            Tool::Swings => self.swings.clear(),
            Tool::Fibonacci => self.fibonacci.get_mut(part).clear(),
            Tool::Fvg => self.fvg.get_mut(part).clear(),
        }
    }

    /// Store a drawing in the bucket for `part`
    pub fn push(&mut self, part: Part, annotation: Annotation) {
        match annotation {
            Annotation::Swing(a) => self.swings.push(a),
            Annotation::Fibonacci(a) => self.fibonacci.get_mut(part).push(a),
            Annotation::Fvg(a) => self.fvg.get_mut(part).push(a),
        }
    }

    /// Everything drawn with `tool`, ready for submission
    pub fn submission(&self, tool: Tool) -> Vec<Annotation> {
        match tool {
            Tool::Swings => self.swings.iter().copied().map(Annotation::from).collect(),
            Tool::Fibonacci => self.fibonacci.combined().copied().map(Annotation::from).collect(),
            Tool::Fvg => self.fvg.combined().copied().map(Annotation::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSelection {
    pub symbol: String,
    pub asset_type: AssetType,
}

/// Complete state of one practice session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub asset: Option<AssetSelection>,
    pub timeframe: Timeframe,
    /// Active drawing tool
    pub tool: Tool,
    /// Active part for multi-part tools
    pub active_part: Part,
    pub drawings: DrawingsState,
    /// Loaded candles, `None` until a fetch resolves
    pub series: Option<Vec<Candle>>,
    /// Last scored submission
    pub result: Option<ValidationResult>,
    /// Whether the results overlay covers the chart
    pub overlay_visible: bool,
    /// Learner answered "no patterns on this chart"
    pub no_patterns_found: bool,
    pub pending_fetch: Option<RequestToken>,
    pub pending_validation: Option<RequestToken>,
    pub next_token: RequestToken,
    /// Last settled state, restored if the pending fetch fails
    #[serde(skip)]
    pub(crate) rollback: Option<Box<SessionState>>,
}

impl SessionState {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            next_token: 1,
            ..Default::default()
        }
    }

    pub fn has_chart(&self) -> bool {
        self.series.is_some()
    }

    pub fn chart_request(&self) -> Option<ChartRequest> {
        self.asset.as_ref().map(|a| ChartRequest {
            asset: a.symbol.clone(),
            asset_type: a.asset_type,
            timeframe: self.timeframe,
        })
    }

    /// Phase to settle into once a chart is on screen
    pub fn loaded_phase(&self) -> SessionPhase {
        if self.result.is_some() {
            SessionPhase::ResultsShown
        } else if self.drawings.count(self.tool) > 0 {
            SessionPhase::Drawing
        } else {
            SessionPhase::ChartReady
        }
    }

    pub(crate) fn issue_token(&mut self) -> RequestToken {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    /// Copy with nothing in flight, in a phase a learner can act from
    pub(crate) fn settled(&self) -> SessionState {
        let phase = if self.has_chart() {
            self.loaded_phase()
        } else if self.asset.is_some() {
            SessionPhase::AssetSelected
        } else {
            SessionPhase::Idle
        };
        SessionState {
            phase,
            pending_fetch: None,
            pending_validation: None,
            rollback: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_core::{AnnotationPoint, FvgBias, LegDirection, SwingKind, Zone};

    fn fib(direction: LegDirection) -> Annotation {
        Annotation::Fibonacci(FibonacciAnnotation {
            start: AnnotationPoint { timestamp: 0, price: 1.0 },
            end: AnnotationPoint { timestamp: 60, price: 2.0 },
            direction,
        })
    }

    #[test]
    fn test_push_routes_by_part() {
        let mut drawings = DrawingsState::default();
        drawings.push(Part::One, fib(LegDirection::Up));
        drawings.push(Part::Two, fib(LegDirection::Down));
        drawings.push(Part::Two, fib(LegDirection::Down));

        assert_eq!(drawings.count(Tool::Fibonacci), 3);
        assert_eq!(drawings.count_part(Tool::Fibonacci, Part::One), 1);
        assert_eq!(drawings.count_part(Tool::Fibonacci, Part::Two), 2);
        assert_eq!(drawings.count(Tool::Swings), 0);
    }

    #[test]
    fn test_clear_bucket_leaves_other_part() {
        let mut drawings = DrawingsState::default();
        drawings.push(Part::One, fib(LegDirection::Up));
        drawings.push(Part::Two, fib(LegDirection::Down));
        drawings.clear_bucket(Tool::Fibonacci, Part::Two);
        assert_eq!(drawings.count_part(Tool::Fibonacci, Part::One), 1);
        assert_eq!(drawings.count_part(Tool::Fibonacci, Part::Two), 0);
    }

    #[test]
    fn test_submission_orders_part1_first() {
        let mut drawings = DrawingsState::default();
        let zone = Zone {
            start_index: 1,
            end_index: 3,
            top_price: 2.0,
            bottom_price: 1.0,
        };
        drawings.push(Part::Two, Annotation::Fvg(FvgAnnotation { zone, bias: FvgBias::Bearish }));
        drawings.push(Part::One, Annotation::Fvg(FvgAnnotation { zone, bias: FvgBias::Bullish }));
        drawings.push(
            Part::One,
            Annotation::Swing(SwingAnnotation {
                point: AnnotationPoint { timestamp: 0, price: 1.0 },
                kind: SwingKind::Low,
            }),
        );

        let submitted = drawings.submission(Tool::Fvg);
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].part(), Some(Part::One));
        assert_eq!(submitted[1].part(), Some(Part::Two));
        assert_eq!(drawings.submission(Tool::Swings).len(), 1);
    }

    #[test]
    fn test_tokens_are_monotonic() {
        let mut state = SessionState::new(Timeframe::Hour1);
        let a = state.issue_token();
        let b = state.issue_token();
        assert!(b > a);
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state.chart_request().is_none());
    }

    #[test]
    fn test_settled_clears_in_flight_work() {
        let mut state = SessionState::new(Timeframe::Hour1);
        state.asset = Some(AssetSelection {
            symbol: "btc".to_string(),
            asset_type: AssetType::Crypto,
        });
        state.phase = SessionPhase::ChartLoading;
        state.pending_fetch = Some(state.issue_token());
        assert_eq!(state.settled().phase, SessionPhase::AssetSelected);
        assert!(state.settled().pending_fetch.is_none());

        state.series = Some(Vec::new());
        state.phase = SessionPhase::Validating;
        state.drawings.push(Part::One, fib(LegDirection::Up));
        state.tool = Tool::Fibonacci;
        assert_eq!(state.settled().phase, SessionPhase::Drawing);
    }
}
