//! Practice Session
//!
//! Drives one learner through fetch → draw → validate → retry. The rules for
//! what survives an asset, timeframe or tool change live in a single pure
//! `transition` function; `PracticeSession` executes the commands it emits
//! against a market-data provider and a validation service.

pub mod error;
pub mod machine;
pub mod session;
pub mod state;

pub use error::SessionError;
pub use machine::{transition, RenderCommand, SessionCommand, SessionEvent, Transition};
pub use session::{PracticeSession, SessionConfig, SessionContext};
pub use state::{AssetSelection, DrawingsState, PartBuckets, RequestToken, SessionPhase, SessionState};
