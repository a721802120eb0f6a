//! Session transitions.
//!
//! `transition` is pure: it never performs I/O. Side effects are returned as
//! `SessionCommand`s for the driver (or a UI shell) to execute, and their
//! completions come back in as events stamped with the issuing token.

use chart_core::{
    Annotation, AssetType, Candle, ChartRequest, Part, Timeframe, Tool, ValidationOutcome, ValidationRequest,
    ValidationResult,
};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::state::{AssetSelection, RequestToken, SessionPhase, SessionState};

/// Learner actions and async completions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SelectAsset { symbol: String, asset_type: AssetType },
    LoadChart,
    SelectTimeframe(Timeframe),
    ChartLoaded { token: RequestToken, series: Vec<Candle> },
    ChartFailed { token: RequestToken, error: String },
    SelectTool(Tool),
    SelectPart(Part),
    AddAnnotation(Annotation),
    MarkNoPatterns,
    Clear,
    Submit,
    ValidationSucceeded { token: RequestToken, outcome: ValidationOutcome },
    ValidationFailed { token: RequestToken, error: String },
    DismissResults,
    TryAgain,
}

/// One-way instructions for the chart surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "camelCase")]
pub enum RenderCommand {
    ClearOverlays,
    ShowResults(ValidationResult),
    HideResults,
    ShowMessage(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    FetchChart { token: RequestToken, request: ChartRequest },
    Validate { token: RequestToken, request: ValidationRequest },
    Render(RenderCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SessionState,
    pub commands: Vec<SessionCommand>,
}

impl Transition {
    fn unchanged(state: &SessionState) -> Self {
        Self {
            state: state.clone(),
            commands: Vec::new(),
        }
    }
}

fn render(command: RenderCommand) -> SessionCommand {
    SessionCommand::Render(command)
}

/// Remember the last settled state before starting a fetch
fn checkpoint(next: &mut SessionState, prior: &SessionState) {
    if next.rollback.is_none() {
        next.rollback = Some(Box::new(prior.settled()));
    }
}

fn start_fetch(next: &mut SessionState, request: ChartRequest, commands: &mut Vec<SessionCommand>) {
    let token = next.issue_token();
    next.pending_fetch = Some(token);
    next.series = None;
    next.phase = SessionPhase::ChartLoading;
    commands.push(SessionCommand::FetchChart { token, request });
}

/// Apply one event. Illegal events return an error and leave `state` untouched.
pub fn transition(state: &SessionState, event: SessionEvent) -> Result<Transition, SessionError> {
    let mut next = state.clone();
    let mut commands = Vec::new();

    match event {
        SessionEvent::SelectAsset { symbol, asset_type } => {
            checkpoint(&mut next, state);
            next.asset = Some(AssetSelection { symbol, asset_type });
            next.drawings.clear_all();
            next.result = None;
            next.overlay_visible = false;
            next.no_patterns_found = false;
            next.series = None;
            next.pending_fetch = None;
            next.pending_validation = None;
            next.phase = SessionPhase::AssetSelected;
            commands.push(render(RenderCommand::HideResults));
            commands.push(render(RenderCommand::ClearOverlays));
        }

        SessionEvent::LoadChart => {
            let request = next.chart_request().ok_or(SessionError::NoAssetSelected)?;
            checkpoint(&mut next, state);
            start_fetch(&mut next, request, &mut commands);
        }

        SessionEvent::SelectTimeframe(timeframe) => {
            if next.asset.is_none() {
                next.timeframe = timeframe;
                return Ok(Transition { state: next, commands });
            }
            if timeframe == state.timeframe && state.has_chart() {
                return Ok(Transition::unchanged(state));
            }

            checkpoint(&mut next, state);
            next.timeframe = timeframe;
            next.pending_validation = None;
            if next.result.is_none() {
                next.drawings.clear_all();
                next.no_patterns_found = false;
                commands.push(render(RenderCommand::ClearOverlays));
            }
            let request = next.chart_request().ok_or(SessionError::NoAssetSelected)?;
            start_fetch(&mut next, request, &mut commands);
        }

        SessionEvent::ChartLoaded { token, series } => {
            if state.pending_fetch != Some(token) {
                tracing::debug!(token, pending = ?state.pending_fetch, "Ignoring stale chart response");
                return Ok(Transition::unchanged(state));
            }
            if series.is_empty() {
                return transition(
                    state,
                    SessionEvent::ChartFailed {
                        token,
                        error: "No candles available for this asset and timeframe".to_string(),
                    },
                );
            }

            next.series = Some(series);
            next.pending_fetch = None;
            next.rollback = None;
            next.phase = next.loaded_phase();
            if let Some(result) = next.result.as_ref().filter(|_| next.overlay_visible) {
                commands.push(render(RenderCommand::ShowResults(result.clone())));
            }
        }

        SessionEvent::ChartFailed { token, error } => {
            if state.pending_fetch != Some(token) {
                tracing::debug!(token, pending = ?state.pending_fetch, "Ignoring stale chart failure");
                return Ok(Transition::unchanged(state));
            }

            next = state.rollback.as_deref().cloned().unwrap_or_else(|| state.settled());
            next.next_token = state.next_token;
            next.pending_fetch = None;
            next.pending_validation = None;
            next.rollback = None;

            commands.push(render(RenderCommand::ShowMessage(error)));
            if let Some(result) = next.result.as_ref().filter(|_| next.overlay_visible) {
                commands.push(render(RenderCommand::ShowResults(result.clone())));
            }
        }

        SessionEvent::SelectTool(tool) => {
            if tool == state.tool {
                return Ok(Transition::unchanged(state));
            }
            next.tool = tool;
            next.active_part = Part::One;
            next.drawings.clear_all();
            next.result = None;
            next.overlay_visible = false;
            next.no_patterns_found = false;
            next.pending_validation = None;
            if next.has_chart() {
                next.phase = SessionPhase::ChartReady;
            }
            commands.push(render(RenderCommand::HideResults));
            commands.push(render(RenderCommand::ClearOverlays));
        }

        SessionEvent::SelectPart(part) => {
            if !state.tool.is_multi_part() {
                return Err(SessionError::SinglePartTool(state.tool));
            }
            next.active_part = part;
        }

        SessionEvent::AddAnnotation(annotation) => {
            ensure_drawable(state)?;
            if annotation.tool() != state.tool {
                return Err(SessionError::WrongTool {
                    drawn: annotation.tool(),
                    active: state.tool,
                });
            }
            next.drawings.push(state.active_part, annotation);
            next.no_patterns_found = false;
            next.phase = SessionPhase::Drawing;
        }

        SessionEvent::MarkNoPatterns => {
            ensure_drawable(state)?;
            next.no_patterns_found = true;
        }

        SessionEvent::Clear => {
            if state.phase == SessionPhase::Validating {
                return Err(SessionError::ValidationInFlight);
            }
            next.drawings.clear_bucket(state.tool, state.active_part);
            next.result = None;
            next.overlay_visible = false;
            next.no_patterns_found = false;
            if next.has_chart() {
                next.phase = next.loaded_phase();
            }
            commands.push(render(RenderCommand::HideResults));
            commands.push(render(RenderCommand::ClearOverlays));
        }

        SessionEvent::Submit => {
            let series = state.series.as_ref().ok_or(SessionError::ChartNotLoaded)?;
            if state.pending_validation.is_some() {
                return Err(SessionError::ValidationInFlight);
            }
            if state.phase == SessionPhase::ResultsShown {
                return Err(SessionError::ResultsShowing);
            }

            let drawings = state.drawings.submission(state.tool);
            if drawings.is_empty() && !state.no_patterns_found {
                return Err(SessionError::NothingToSubmit(state.tool));
            }

            let token = next.issue_token();
            let request = ValidationRequest {
                tool: state.tool,
                part: state.active_part,
                no_patterns_found: drawings.is_empty(),
                drawings,
                series: series.clone(),
                include_multi_part: state.tool.is_multi_part(),
            };
            next.pending_validation = Some(token);
            next.phase = SessionPhase::Validating;
            commands.push(SessionCommand::Validate { token, request });
        }

        SessionEvent::ValidationSucceeded { token, outcome } => {
            if state.pending_validation != Some(token) {
                tracing::debug!(token, pending = ?state.pending_validation, "Ignoring stale validation result");
                return Ok(Transition::unchanged(state));
            }
            next.pending_validation = None;
            match outcome {
                ValidationOutcome::Scored(result) => {
                    next.result = Some(result.clone());
                    next.overlay_visible = true;
                    next.phase = SessionPhase::ResultsShown;
                    commands.push(render(RenderCommand::ShowResults(result)));
                }
                ValidationOutcome::Rejected(rejection) => {
                    next.phase = SessionPhase::Drawing;
                    commands.push(render(RenderCommand::ShowMessage(rejection.message)));
                }
            }
        }

        SessionEvent::ValidationFailed { token, error } => {
            if state.pending_validation != Some(token) {
                tracing::debug!(token, pending = ?state.pending_validation, "Ignoring stale validation failure");
                return Ok(Transition::unchanged(state));
            }
            next.pending_validation = None;
            next.phase = SessionPhase::Drawing;
            commands.push(render(RenderCommand::ShowMessage(error)));
        }

        SessionEvent::DismissResults => {
            if state.result.is_none() {
                return Err(SessionError::NoResults);
            }
            next.overlay_visible = false;
            commands.push(render(RenderCommand::HideResults));
        }

        SessionEvent::TryAgain => {
            if state.phase != SessionPhase::ResultsShown {
                return Err(SessionError::NoResults);
            }
            next.result = None;
            next.overlay_visible = false;
            next.no_patterns_found = false;
            next.phase = SessionPhase::Drawing;
            commands.push(render(RenderCommand::HideResults));
            commands.push(render(RenderCommand::ClearOverlays));
        }
    }

    Ok(Transition { state: next, commands })
}

fn ensure_drawable(state: &SessionState) -> Result<(), SessionError> {
    match state.phase {
        SessionPhase::Validating => Err(SessionError::ValidationInFlight),
        SessionPhase::ResultsShown => Err(SessionError::ResultsShowing),
        _ if !state.has_chart() => Err(SessionError::ChartNotLoaded),
        _ => Ok(()),
    }
}
