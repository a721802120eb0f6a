//! Async driver around the session state machine.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chart_core::{
    Annotation, AssetType, MarketDataProvider, Part, Timeframe, Tool, TrainerError, ValidationService,
};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::SessionError;
use crate::machine::{transition, RenderCommand, SessionCommand, SessionEvent};
use crate::state::SessionState;

/// Who is practising and how they see the chart. Passed in, never read from globals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: Option<String>,
    pub dark_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on each fetch/validate call
    pub request_timeout: Duration,
    pub default_timeframe: Timeframe,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            default_timeframe: Timeframe::Day1,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, TrainerError> {
        let secs: u64 = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| TrainerError::Config("REQUEST_TIMEOUT_SECS must be a whole number of seconds".to_string()))?;
        let default_timeframe = env::var("DEFAULT_TIMEFRAME")
            .unwrap_or_else(|_| "1d".to_string())
            .parse()
            .map_err(TrainerError::Config)?;

        Ok(Self {
            request_timeout: Duration::from_secs(secs),
            default_timeframe,
        })
    }
}

/// One learner's practice session.
///
/// Render commands accumulate in an outbox the UI drains; fetch and validate
/// commands are executed here with a bounded timeout.
pub struct PracticeSession {
    id: String,
    context: SessionContext,
    config: SessionConfig,
    provider: Arc<dyn MarketDataProvider>,
    validator: Arc<dyn ValidationService>,
    state: SessionState,
    outbox: Vec<RenderCommand>,
}

impl PracticeSession {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        validator: Arc<dyn ValidationService>,
        context: SessionContext,
        config: SessionConfig,
    ) -> Self {
        let state = SessionState::new(config.default_timeframe);
        Self {
            id: Uuid::new_v4().to_string(),
            context,
            config,
            provider,
            validator,
            state,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Take every render command emitted since the last drain
    pub fn drain_render(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply an event and return the effects still to run
    pub fn dispatch(&mut self, event: SessionEvent) -> Result<Vec<SessionCommand>, SessionError> {
        let transition = match transition(&self.state, event) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(session = %self.id, phase = %self.state.phase, error = %e, "Event rejected");
                self.outbox.push(RenderCommand::ShowMessage(e.to_string()));
                return Err(e);
            }
        };

        if transition.state.phase != self.state.phase {
            tracing::debug!(
                session = %self.id,
                from = %self.state.phase,
                to = %transition.state.phase,
                "Session phase changed"
            );
        }
        self.state = transition.state;

        let mut effects = Vec::new();
        for command in transition.commands {
            match command {
                SessionCommand::Render(render) => self.outbox.push(render),
                other => effects.push(other),
            }
        }
        Ok(effects)
    }

    /// Run one effect and return the completion event, without applying it
    pub async fn resolve(&self, command: SessionCommand) -> Option<SessionEvent> {
        let limit = self.config.request_timeout;
        match command {
            SessionCommand::FetchChart { token, request } => {
                let fetched = match timeout(limit, self.provider.fetch_chart(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(TrainerError::RequestTimeout(limit.as_secs())),
                };
                Some(match fetched {
                    Ok(series) => {
                        tracing::info!(
                            session = %self.id,
                            asset = %request.asset,
                            timeframe = %request.timeframe,
                            candles = series.len(),
                            "Chart loaded"
                        );
                        SessionEvent::ChartLoaded { token, series }
                    }
                    Err(e) => {
                        tracing::warn!(session = %self.id, asset = %request.asset, error = %e, "Chart fetch failed");
                        SessionEvent::ChartFailed {
                            token,
                            error: e.to_string(),
                        }
                    }
                })
            }
            SessionCommand::Validate { token, request } => {
                let validated = match timeout(limit, self.validator.validate(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(TrainerError::RequestTimeout(limit.as_secs())),
                };
                Some(match validated {
                    Ok(outcome) => SessionEvent::ValidationSucceeded { token, outcome },
                    Err(e) => {
                        tracing::warn!(session = %self.id, error = %e, "Validation request failed");
                        SessionEvent::ValidationFailed {
                            token,
                            error: e.to_string(),
                        }
                    }
                })
            }
            SessionCommand::Render(render) => {
                tracing::debug!(command = ?render, "Render commands are not resolved by the driver");
                None
            }
        }
    }

    /// Dispatch an event and run every effect it triggers to completion
    pub async fn run(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let mut queue = self.dispatch(event)?;
        while let Some(command) = queue.pop() {
            if let Some(done) = self.resolve(command).await {
                queue.extend(self.dispatch(done)?);
            }
        }
        Ok(())
    }

    pub async fn select_asset(&mut self, symbol: &str, asset_type: AssetType) -> Result<(), SessionError> {
        tracing::info!(session = %self.id, asset = symbol, "Asset selected");
        self.run(SessionEvent::SelectAsset {
            symbol: symbol.to_string(),
            asset_type,
        })
        .await?;
        self.run(SessionEvent::LoadChart).await
    }

    pub async fn select_timeframe(&mut self, timeframe: Timeframe) -> Result<(), SessionError> {
        self.run(SessionEvent::SelectTimeframe(timeframe)).await
    }

    pub fn select_tool(&mut self, tool: Tool) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::SelectTool(tool)).map(|_| ())
    }

    pub fn select_part(&mut self, part: Part) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::SelectPart(part)).map(|_| ())
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::AddAnnotation(annotation)).map(|_| ())
    }

    pub fn mark_no_patterns(&mut self) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::MarkNoPatterns).map(|_| ())
    }

    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::Clear).map(|_| ())
    }

    pub async fn submit(&mut self) -> Result<(), SessionError> {
        tracing::info!(session = %self.id, tool = %self.state.tool, "Submitting annotations");
        self.run(SessionEvent::Submit).await
    }

    pub fn dismiss_results(&mut self) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::DismissResults).map(|_| ())
    }

    pub fn try_again(&mut self) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::TryAgain).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionPhase;
    use annotation_validator::ValidationEngine;
    use async_trait::async_trait;
    use chart_core::{
        AnnotationPoint, Candle, ChartRequest, SwingAnnotation, SwingKind, ValidationConfig, ValidationOutcome,
        ValidationRequest,
    };

    /// Same zig-zag for every asset, highs at 3 and 8 and a low at 6 for radius 2
    struct StaticProvider {
        delay: Duration,
        fail_for: Option<String>,
    }

    impl StaticProvider {
        fn new() -> Self {
            Self {
                delay: Duration::ZERO,
                fail_for: None,
            }
        }
    }

    fn zigzag() -> Vec<Candle> {
        let highs = [1.0, 2.0, 3.0, 5.0, 3.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0];
        highs
            .iter()
            .enumerate()
            .map(|(i, &h)| Candle {
                timestamp: 1_700_000_000 + i as i64 * 3600,
                open: h - 1.0,
                high: h,
                low: h - 1.0,
                close: h,
            })
            .collect()
    }

    #[async_trait]
    impl MarketDataProvider for StaticProvider {
        async fn fetch_chart(&self, request: &ChartRequest) -> Result<Vec<Candle>, TrainerError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_for.as_deref() == Some(request.asset.as_str()) {
                return Err(TrainerError::DataUnavailable(format!("no data for {}", request.asset)));
            }
            Ok(zigzag())
        }
    }

    struct SlowValidator;

    #[async_trait]
    impl ValidationService for SlowValidator {
        async fn validate(&self, _request: ValidationRequest) -> Result<ValidationOutcome, TrainerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(TrainerError::Api("unreachable".to_string()))
        }
    }

    fn engine() -> Arc<ValidationEngine> {
        Arc::new(ValidationEngine::new(ValidationConfig {
            swing_radius: 2,
            ..Default::default()
        }))
    }

    fn session(provider: StaticProvider) -> PracticeSession {
        PracticeSession::new(
            Arc::new(provider),
            engine(),
            SessionContext {
                user_id: Some("learner-1".to_string()),
                dark_mode: true,
            },
            SessionConfig {
                request_timeout: Duration::from_millis(100),
                default_timeframe: Timeframe::Hour1,
            },
        )
    }

    fn high_at(i: usize) -> Annotation {
        let c = zigzag()[i];
        Annotation::Swing(SwingAnnotation {
            point: AnnotationPoint {
                timestamp: c.timestamp,
                price: c.high,
            },
            kind: SwingKind::High,
        })
    }

    #[tokio::test]
    async fn test_btc_validate_timeframe_then_asset_change() {
        let mut s = session(StaticProvider::new());
        s.select_asset("btc", AssetType::Crypto).await.unwrap();
        assert_eq!(s.state().phase, SessionPhase::ChartReady);

        s.add_annotation(high_at(3)).unwrap();
        s.add_annotation(high_at(8)).unwrap();
        s.submit().await.unwrap();

        let result = s.state().result.clone().expect("scored");
        assert_eq!((result.score, result.total_expected_points), (2, 3));
        assert_eq!(s.state().phase, SessionPhase::ResultsShown);

        s.select_timeframe(Timeframe::Hour4).await.unwrap();
        assert_eq!(s.state().timeframe, Timeframe::Hour4);
        assert_eq!(s.state().drawings.swings.len(), 2);
        assert_eq!(s.state().result.as_ref().map(|r| r.score), Some(2));

        s.select_asset("eth", AssetType::Crypto).await.unwrap();
        assert!(s.state().drawings.is_empty());
        assert!(s.state().result.is_none());
        assert_eq!(s.state().phase, SessionPhase::ChartReady);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_prior_asset() {
        let mut s = session(StaticProvider {
            delay: Duration::ZERO,
            fail_for: Some("doge".to_string()),
        });
        s.select_asset("btc", AssetType::Crypto).await.unwrap();
        s.add_annotation(high_at(3)).unwrap();
        s.drain_render();

        s.select_asset("doge", AssetType::Crypto).await.unwrap();
        let state = s.state();
        assert_eq!(state.asset.as_ref().map(|a| a.symbol.as_str()), Some("btc"));
        assert_eq!(state.drawings.swings.len(), 1);
        assert!(s
            .drain_render()
            .iter()
            .any(|r| matches!(r, RenderCommand::ShowMessage(m) if m.contains("doge"))));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_surfaced() {
        let mut s = session(StaticProvider {
            delay: Duration::from_secs(5),
            fail_for: None,
        });
        s.select_asset("btc", AssetType::Crypto).await.unwrap();
        assert!(s.state().asset.is_none());
        assert_eq!(s.state().phase, SessionPhase::Idle);
        assert!(s
            .drain_render()
            .iter()
            .any(|r| matches!(r, RenderCommand::ShowMessage(m) if m.contains("timed out"))));
        assert!(TrainerError::RequestTimeout(0).is_retryable());
    }

    #[tokio::test]
    async fn test_validation_timeout_keeps_drawings() {
        let mut s = PracticeSession::new(
            Arc::new(StaticProvider::new()),
            Arc::new(SlowValidator),
            SessionContext::default(),
            SessionConfig {
                request_timeout: Duration::from_millis(50),
                default_timeframe: Timeframe::Hour1,
            },
        );
        s.select_asset("btc", AssetType::Crypto).await.unwrap();
        s.add_annotation(high_at(3)).unwrap();
        s.submit().await.unwrap();

        assert_eq!(s.state().phase, SessionPhase::Drawing);
        assert_eq!(s.state().drawings.swings.len(), 1);
        assert!(s.state().result.is_none());
    }

    #[tokio::test]
    async fn test_stale_fetch_completion_is_ignored() {
        let mut s = session(StaticProvider::new());
        let _ = s
            .dispatch(SessionEvent::SelectAsset {
                symbol: "btc".to_string(),
                asset_type: AssetType::Crypto,
            })
            .unwrap();
        let slow = s.dispatch(SessionEvent::LoadChart).unwrap().remove(0);
        let fast = s.dispatch(SessionEvent::SelectTimeframe(Timeframe::Hour4)).unwrap().remove(0);

        let fast_done = s.resolve(fast).await.unwrap();
        s.dispatch(fast_done).unwrap();
        let settled = s.state().clone();

        let slow_done = s.resolve(slow).await.unwrap();
        assert!(s.dispatch(slow_done).unwrap().is_empty());
        assert_eq!(s.state(), &settled);
        assert_eq!(s.state().timeframe, Timeframe::Hour4);
    }

    #[tokio::test]
    async fn test_tool_switch_clears_results_and_drawings() {
        let mut s = session(StaticProvider::new());
        s.select_asset("btc", AssetType::Crypto).await.unwrap();
        s.add_annotation(high_at(3)).unwrap();
        s.submit().await.unwrap();
        assert!(s.state().result.is_some());

        s.select_tool(Tool::Fvg).unwrap();
        assert!(s.state().drawings.is_empty());
        assert!(s.state().result.is_none());
        assert_eq!(s.state().active_part, Part::One);
        assert!(s.drain_render().contains(&RenderCommand::ClearOverlays));
    }

    #[tokio::test]
    async fn test_rejected_event_is_reported_to_ui() {
        let mut s = session(StaticProvider::new());
        s.select_asset("btc", AssetType::Crypto).await.unwrap();
        s.drain_render();

        let err = s.submit().await.unwrap_err();
        assert_eq!(err, SessionError::NothingToSubmit(Tool::Swings));
        assert_eq!(s.drain_render(), vec![RenderCommand::ShowMessage(err.to_string())]);
        assert!(s.context().dark_mode);
        assert!(!s.id().is_empty());
    }
}
