use chart_core::Tool;
use thiserror::Error;

/// Events the current phase does not allow. Messages are shown to the learner as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Select an asset first")]
    NoAssetSelected,

    #[error("Chart data is still loading")]
    ChartNotLoaded,

    #[error("Your answer is already being checked")]
    ValidationInFlight,

    #[error("Draw at least one annotation with the {0} tool, or mark \"no patterns found\"")]
    NothingToSubmit(Tool),

    #[error("The {0} tool has only one part")]
    SinglePartTool(Tool),

    #[error("This is a {drawn} drawing but the active tool is {active}")]
    WrongTool { drawn: Tool, active: Tool },

    #[error("Press \"Try Again\" to keep drawing")]
    ResultsShowing,

    #[error("There are no results to show")]
    NoResults,
}
