pub mod engine;
pub mod feedback;
pub mod matcher;

pub use engine::ValidationEngine;
pub use feedback::{FeedbackComposer, CORRECT_GLYPH, INCORRECT_GLYPH, WARNING_GLYPH};
pub use matcher::{LearnerVerdict, MatchReport, Matcher, MismatchReason};
