//! Tide derivation, condition scoring and recommendations

pub mod conditions;
pub mod recommendation;
pub mod tide_analysis;

pub use conditions::{ActivityScore, MarineAssessment, ScoreFactor, assess};
pub use recommendation::recommend;
pub use tide_analysis::{TideAnalysis, analyze};
